use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::catalog::TenantId;
use crate::cnf::{CODE_PADDING, PREFIX_LENGTH};

/// The last counter value handed out for every `(table, tenant, prefix)`.
///
/// Counters are created lazily, start from zero, and only ever move up.
/// A single instance is shared by every generator in the process.
#[derive(Debug, Default)]
pub struct Counters {
	tables: Mutex<HashMap<String, HashMap<String, u64>>>,
}

/// Builds the key of a counter within its table. The prefix is
/// right-padded to the full prefix length.
fn key(tenant: TenantId, prefix: &str) -> String {
	let mut key = format!("{tenant}:{prefix}");
	let len = prefix.chars().count();
	key.extend(std::iter::repeat_n(CODE_PADDING, PREFIX_LENGTH.saturating_sub(len)));
	key
}

impl Counters {
	pub fn new() -> Self {
		Self::default()
	}

	/// Increments a counter and returns the new value. Unknown counters
	/// start from zero, so their first value is 1.
	pub fn increment(&self, table: &str, tenant: TenantId, prefix: &str) -> u64 {
		let mut tables = self.tables.lock();
		let counter =
			tables.entry(table.to_owned()).or_default().entry(key(tenant, prefix)).or_default();
		*counter += 1;
		*counter
	}

	/// Moves a counter up to `candidate`, unless it is already at or above
	/// it. Unknown counters are created with the candidate value.
	pub fn set_if_greater(&self, table: &str, tenant: TenantId, prefix: &str, candidate: u64) {
		let mut tables = self.tables.lock();
		let counter =
			tables.entry(table.to_owned()).or_default().entry(key(tenant, prefix)).or_default();
		if candidate > *counter {
			*counter = candidate;
		}
	}

	/// The current value of a counter, or 0 if it was never used
	pub fn get(&self, table: &str, tenant: TenantId, prefix: &str) -> u64 {
		let tables = self.tables.lock();
		tables.get(table).and_then(|t| t.get(&key(tenant, prefix))).copied().unwrap_or(0)
	}

	/// A sorted copy of every counter, keyed by table and by
	/// `tenant:prefix`
	pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, u64>> {
		let tables = self.tables.lock();
		tables
			.iter()
			.map(|(table, counters)| {
				(table.clone(), counters.iter().map(|(k, v)| (k.clone(), *v)).collect())
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashSet;
	use std::sync::Arc;
	use std::sync::atomic::{AtomicBool, Ordering};

	use super::*;

	#[test]
	fn counters_start_at_one() {
		let counters = Counters::new();
		let tenant = TenantId::new();
		assert_eq!(counters.get("workers", tenant, "DOE"), 0);
		assert_eq!(counters.increment("workers", tenant, "DOE"), 1);
		assert_eq!(counters.increment("workers", tenant, "DOE"), 2);
		assert_eq!(counters.get("workers", tenant, "DOE"), 2);
		assert_eq!(counters.get("workers", TenantId::new(), "DOE"), 0);
		assert_eq!(counters.get("customers", tenant, "DOE"), 0);
	}

	#[test]
	fn short_prefixes_are_padded_in_keys() {
		let counters = Counters::new();
		let tenant = TenantId::new();
		counters.increment("workers", tenant, "DOE");
		let snapshot = counters.snapshot();
		let key = format!("{tenant}:DOE ");
		assert_eq!(snapshot["workers"][&key], 1);
		// The padded prefix names the same counter
		assert_eq!(counters.get("workers", tenant, "DOE "), 1);
	}

	#[test]
	fn set_if_greater_only_moves_up() {
		let counters = Counters::new();
		let tenant = TenantId::new();
		counters.set_if_greater("customers", tenant, "TARG", 5);
		counters.set_if_greater("customers", tenant, "TARG", 2);
		assert_eq!(counters.get("customers", tenant, "TARG"), 5);
		assert_eq!(counters.increment("customers", tenant, "TARG"), 6);
		counters.set_if_greater("customers", tenant, "BEST", 0);
		assert!(counters.snapshot()["customers"].contains_key(&format!("{tenant}:BEST")));
	}

	#[test]
	fn concurrent_increments_are_distinct() {
		let counters = Arc::new(Counters::new());
		let tenant = TenantId::new();
		let handles: Vec<_> = (0..8)
			.map(|i| {
				let counters = counters.clone();
				std::thread::spawn(move || {
					let mut seen = Vec::new();
					for n in 0..500 {
						if n % 100 == 0 {
							counters.set_if_greater("workers", tenant, "SMIT", i * 10);
						}
						seen.push(counters.increment("workers", tenant, "SMIT"));
					}
					seen
				})
			})
			.collect();
		let mut all = HashSet::new();
		for h in handles {
			for v in h.join().unwrap() {
				assert!(all.insert(v), "counter {v} was returned twice");
			}
		}
		assert_eq!(all.len(), 4000);
		assert!(counters.get("workers", tenant, "SMIT") >= 4000);
	}

	#[test]
	fn concurrent_ratchets_are_never_undone() {
		let counters = Arc::new(Counters::new());
		let raised = Arc::new(AtomicBool::new(false));
		let tenant = TenantId::new();
		let handles: Vec<_> = (0..8)
			.map(|i| {
				let counters = counters.clone();
				let raised = raised.clone();
				std::thread::spawn(move || {
					let mut after = Vec::new();
					let mut seen = Vec::new();
					for n in 0..500 {
						if i == 0 && n == 250 {
							counters.set_if_greater("workers", tenant, "SMIT", 1_000_000);
							raised.store(true, Ordering::SeqCst);
						}
						// Increments which start after the raise must land above it
						let late = raised.load(Ordering::SeqCst);
						let v = counters.increment("workers", tenant, "SMIT");
						if late {
							after.push(v);
						}
						seen.push(v);
					}
					(seen, after)
				})
			})
			.collect();
		let mut all = HashSet::new();
		let mut after = Vec::new();
		for h in handles {
			let (seen, late) = h.join().unwrap();
			for v in seen {
				assert!(all.insert(v), "counter {v} was returned twice");
			}
			after.extend(late);
		}
		assert!(after.len() >= 250);
		assert!(after.iter().all(|v| *v > 1_000_000), "a value fell below the ratchet");
		assert!(counters.get("workers", tenant, "SMIT") > 1_000_000);
		assert_eq!(all.len(), 4000);
	}
}
