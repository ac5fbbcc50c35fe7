//! Pro numbers: year-prefixed serials which are strictly monotonic per tenant.
//!
//! A pro number has the form `S<YYYY>-<NNNNNN>`. The serial comes from a
//! durable per-tenant counter row which is locked, incremented and upserted
//! in a single transaction. The year comes from the injected clock when the
//! number is formatted, so the serial keeps counting across years.

use std::fmt::{self, Display};
use std::sync::LazyLock;
use std::time::Duration;

use chrono::Datelike;
use rand::{Rng, thread_rng};
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::catalog::TenantId;
use crate::cnf::{PRO_NUMBER_PREFIX, PRO_NUMBER_TABLE, PRO_NUMBER_WIDTH};
use crate::ctx::Context;
use crate::err::{Error, Result};
use crate::store::{Datastore, LockType, SizedClock, TransactionType};

const TARGET: &str = "tenantcode::core::pronumber";

/// Serialises allocations within the process, on top of the row lock.
static ALLOCATION_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// A parsed pro number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProNumber {
	pub year: i32,
	pub serial: i64,
}

impl Display for ProNumber {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(
			f,
			"{PRO_NUMBER_PREFIX}{:04}-{:0width$}",
			self.year,
			self.serial,
			width = PRO_NUMBER_WIDTH
		)
	}
}

/// Splits a pro number into its year and serial.
pub fn parse_pro_number(v: &str) -> Option<ProNumber> {
	let rest = v.strip_prefix(PRO_NUMBER_PREFIX)?;
	let (year, serial) = rest.split_once('-')?;
	let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
	if year.len() != 4 || serial.len() < PRO_NUMBER_WIDTH || !digits(year) || !digits(serial) {
		return None;
	}
	Some(ProNumber {
		year: year.parse().ok()?,
		serial: serial.parse().ok()?,
	})
}

/// Allocates pro numbers from the durable per-tenant counters.
#[derive(Clone, Debug)]
pub struct ProNumberGenerator {
	/// The source of the year
	clock: SizedClock,
}

impl ProNumberGenerator {
	pub fn new(clock: SizedClock) -> Self {
		Self {
			clock,
		}
	}

	/// Allocates the next pro number of a tenant.
	///
	/// Concurrent callers receive strictly increasing serials, in the order
	/// the counter row was locked. A cancelled call rolls back its
	/// transaction, so no serial is consumed. Conflicting allocations are
	/// re-run up to the transaction retry limit of the datastore options.
	#[instrument(level = "trace", target = "tenantcode::core::pronumber", skip(self, ctx, ds))]
	pub async fn next_pro_number(
		&self,
		ctx: &Context,
		ds: &Datastore,
		tenant: TenantId,
	) -> Result<String> {
		let _guard = ctx.run(async { Ok(ALLOCATION_LOCK.lock().await) }).await?;
		let retries = ds.options().transaction_max_retries;
		// Use for exponential backoff
		let mut tempo = 4;
		const MAX_BACKOFF: u64 = 32_768;
		let mut attempts = 0;
		let serial = loop {
			match ctx.run(self.allocate(ds, tenant)).await {
				Ok(v) => break v,
				Err(e) if e.is_retryable() && attempts < retries => {
					attempts += 1;
					debug!(target: TARGET, %tenant, attempts, error = %e, "Retrying pro number allocation");
					// exponential backoff with full jitter
					let sleep_ms = thread_rng().gen_range(1..=tempo);
					ctx.run(async {
						sleep(Duration::from_millis(sleep_ms)).await;
						Ok(())
					})
					.await?;
					if tempo < MAX_BACKOFF {
						tempo *= 2;
					}
				}
				Err(e) if e.is_retryable() => {
					return Err(Error::StoreUnavailable {
						table: Some(PRO_NUMBER_TABLE.to_owned()),
						message: e.to_string(),
					});
				}
				Err(e) => return Err(e.on_table(PRO_NUMBER_TABLE)),
			}
		};
		let number = ProNumber {
			year: self.clock.now().year(),
			serial,
		};
		Ok(number.to_string())
	}

	/// Locks, increments and upserts the counter row of a tenant
	async fn allocate(&self, ds: &Datastore, tenant: TenantId) -> Result<i64> {
		let tx = ds.transaction(TransactionType::Write, LockType::Pessimistic).await?;
		let res = async {
			let mut counter = tx.lock_pro_number_counter(tenant).await?;
			counter.last_used_number += 1;
			counter.updated_at = self.clock.now();
			tx.upsert_pro_number_counter(&counter).await?;
			Ok(counter.last_used_number)
		}
		.await;
		run!(tx, res)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ctx::MutableContext;
	use crate::options::EngineOptions;

	async fn datastore(retries: u32) -> Datastore {
		let options = EngineOptions::default().with_transaction_max_retries(retries);
		Datastore::new_with_options("memory", None, options).await.unwrap()
	}

	#[tokio::test]
	async fn conflicting_allocations_are_retried() {
		let ctx = MutableContext::background().freeze();
		let ds = datastore(3).await;
		let mem = ds.mem().unwrap();
		mem.force_conflicts(2);
		let generator = ProNumberGenerator::new(ds.clock().clone());
		let v = generator.next_pro_number(&ctx, &ds, TenantId::new()).await.unwrap();
		assert_eq!(parse_pro_number(&v).map(|v| v.serial), Some(1));
		assert_eq!(mem.pending_conflicts(), 0);
	}

	#[tokio::test]
	async fn exhausted_retries_report_the_counter_table() {
		let ctx = MutableContext::background().freeze();
		let ds = datastore(3).await;
		let mem = ds.mem().unwrap();
		mem.force_conflicts(u32::MAX);
		let generator = ProNumberGenerator::new(ds.clock().clone());
		let tenant = TenantId::new();
		let res = generator.next_pro_number(&ctx, &ds, tenant).await;
		assert!(matches!(
			res,
			Err(Error::StoreUnavailable { table: Some(ref t), .. }) if t == PRO_NUMBER_TABLE
		));
		// The first attempt and three retries
		assert_eq!(u32::MAX - mem.pending_conflicts(), 4);
		// Nothing was consumed
		mem.force_conflicts(0);
		let v = generator.next_pro_number(&ctx, &ds, tenant).await.unwrap();
		assert_eq!(parse_pro_number(&v).map(|v| v.serial), Some(1));
	}

	#[test]
	fn pro_numbers_are_padded() {
		let v = ProNumber {
			year: 2023,
			serial: 8,
		};
		assert_eq!(v.to_string(), "S2023-000008");
		let v = ProNumber {
			year: 2024,
			serial: 1_234_567,
		};
		assert_eq!(v.to_string(), "S2024-1234567");
	}

	#[test]
	fn pro_numbers_parse_back() {
		assert_eq!(
			parse_pro_number("S2024-000009"),
			Some(ProNumber {
				year: 2024,
				serial: 9
			})
		);
		assert_eq!(parse_pro_number("S2024-1234567").map(|v| v.serial), Some(1_234_567));
		assert_eq!(parse_pro_number("S24-000009"), None);
		assert_eq!(parse_pro_number("S2024-00009"), None);
		assert_eq!(parse_pro_number("X2024-000009"), None);
		assert_eq!(parse_pro_number("S2024000009"), None);
		assert_eq!(parse_pro_number("S2024-+00009"), None);
		assert_eq!(parse_pro_number(""), None);
	}
}
