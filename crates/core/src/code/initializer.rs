use std::sync::Arc;

use super::counter::Counters;
use super::pattern::{take, trim_padding};
use crate::catalog::{CodeRow, TenantId};
use crate::cnf::PREFIX_LENGTH;
use crate::ctx::Context;
use crate::err::{Error, Result};
use crate::store::{Datastore, LockType, TransactionType};

const TARGET: &str = "tenantcode::core::code::initializer";

/// A counter value recovered from a stored code.
#[derive(Debug, PartialEq, Eq)]
struct Seed {
	tenant: TenantId,
	prefix: String,
	counter: u64,
}

/// Seeds the in-memory counters from the codes already in the store, so
/// that new codes continue after the historical ones.
#[derive(Clone, Debug)]
pub struct Initializer {
	counters: Arc<Counters>,
}

impl Initializer {
	pub fn new(counters: Arc<Counters>) -> Self {
		Self {
			counters,
		}
	}

	/// Scans every given table and seeds the counters.
	///
	/// Nothing is seeded unless every table could be scanned and every code
	/// could be split into a prefix and a counter. Running this again over
	/// the same rows leaves the counters unchanged.
	#[instrument(level = "trace", target = "tenantcode::core::code::initializer", skip_all)]
	pub async fn run(&self, ctx: &Context, ds: &Datastore, tables: &[&str]) -> Result<()> {
		let tx = ds.transaction(TransactionType::Read, LockType::Optimistic).await?;
		let mut seeds = Vec::with_capacity(tables.len());
		for table in tables {
			let rows = ctx.run(tx.scan_codes(table)).await;
			let rows = catch!(tx, rows.map_err(|e| e.on_table(table)));
			let parsed = catch!(tx, parse_rows(table, &rows));
			seeds.push((*table, rows.len(), parsed));
		}
		tx.cancel().await?;
		for (table, rows, parsed) in seeds {
			for seed in &parsed {
				self.counters.set_if_greater(table, seed.tenant, &seed.prefix, seed.counter);
			}
			debug!(target: TARGET, table, rows, counters = parsed.len(), "Seeded code counters");
		}
		info!(target: TARGET, tables = tables.len(), "Initialized code counters");
		Ok(())
	}
}

/// Splits every non-empty code of a table into its prefix and counter.
fn parse_rows(table: &str, rows: &[CodeRow]) -> Result<Vec<Seed>> {
	let mut out = Vec::with_capacity(rows.len());
	for row in rows.iter().filter(|r| !r.code.is_empty()) {
		out.push(parse_code(table, row)?);
	}
	Ok(out)
}

/// Splits a stored code into its prefix and counter. Codes whose counter
/// can not be parsed are logged, and keep any trailing digits they have.
fn parse_code(table: &str, row: &CodeRow) -> Result<Seed> {
	let prefix = take(&row.code, PREFIX_LENGTH);
	if prefix.chars().count() < PREFIX_LENGTH {
		return Err(Error::MalformedCode {
			table: table.to_owned(),
			code: row.code.clone(),
		});
	}
	let rest = trim_padding(&row.code[prefix.len()..]);
	let counter = match rest {
		"" => 0,
		rest => match rest.parse::<u64>() {
			Ok(v) => v,
			Err(e) => {
				warn!(target: TARGET, table, code = %row.code, tenant = %row.organization_id, error = %e, "Unable to parse the counter of a stored code");
				trailing_digits(rest)
			}
		},
	};
	Ok(Seed {
		tenant: row.organization_id,
		prefix: prefix.to_owned(),
		counter,
	})
}

/// The value of the run of ASCII digits which ends a string, or 0.
///
/// Legacy codes whose counter part is not all digits keep the digits at
/// their end, so `BESTX0001` seeds the `BEST` counter at 1, not 0.
fn trailing_digits(v: &str) -> u64 {
	let digits = v.bytes().rev().take_while(u8::is_ascii_digit).count();
	v[v.len() - digits..].parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn row(tenant: TenantId, code: &str) -> CodeRow {
		CodeRow {
			code: code.to_owned(),
			organization_id: tenant,
		}
	}

	#[test]
	fn codes_split_into_prefix_and_counter() {
		let t = TenantId::new();
		let seed = parse_code("customers", &row(t, "TARG0005  ")).unwrap();
		assert_eq!(seed.prefix, "TARG");
		assert_eq!(seed.counter, 5);
		let seed = parse_code("customers", &row(t, "TARG")).unwrap();
		assert_eq!(seed.counter, 0);
		let seed = parse_code("customers", &row(t, "TARG123456")).unwrap();
		assert_eq!(seed.counter, 123456);
		let seed = parse_code("workers", &row(t, "DOE0001   ")).unwrap();
		assert_eq!(seed.prefix, "DOE0");
		assert_eq!(seed.counter, 1);
	}

	#[test]
	fn legacy_codes_keep_trailing_digits() {
		let t = TenantId::new();
		let seed = parse_code("customers", &row(t, "BESTX0001")).unwrap();
		assert_eq!(seed.prefix, "BEST");
		assert_eq!(seed.counter, 1);
		let seed = parse_code("customers", &row(t, "BESTXXXX")).unwrap();
		assert_eq!(seed.counter, 0);
		let seed = parse_code("customers", &row(t, "ÅSEN12")).unwrap();
		assert_eq!(seed.prefix, "ÅSEN");
		assert_eq!(seed.counter, 12);
	}

	#[test]
	fn short_codes_are_malformed() {
		let t = TenantId::new();
		let res = parse_code("customers", &row(t, "ABC"));
		assert!(matches!(
			res,
			Err(Error::MalformedCode { ref table, ref code }) if table == "customers" && code == "ABC"
		));
	}

	#[test]
	fn empty_codes_are_skipped() {
		let t = TenantId::new();
		let seeds = parse_rows("customers", &[row(t, ""), row(t, "TARG0002")]).unwrap();
		assert_eq!(seeds.len(), 1);
	}
}
