#![cfg(feature = "store-mem")]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
#[cfg(test)]
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::catalog::{CodeRow, EntityKey, EntityKind, MasterKey, ProNumberCounter, Record, TenantId};
use crate::code::Pattern;
use crate::err::{Error, Result};
use crate::store::{Check, LockType};
use crate::store::api::{Transactable, ensure};

type RowLock = Arc<tokio::sync::Mutex<()>>;

/// The committed contents of the store.
#[derive(Default)]
struct State {
	tables: HashMap<String, Table>,
	pro_numbers: HashMap<TenantId, ProNumberCounter>,
	master_keys: HashMap<TenantId, MasterKey>,
	entity_keys: HashMap<(TenantId, EntityKind), EntityKey>,
}

#[derive(Default)]
struct Table {
	rows: HashMap<Uuid, Record>,
	codes: HashMap<(TenantId, String), Uuid>,
}

impl Table {
	fn owner(&self, tenant: TenantId, code: &str) -> Option<Uuid> {
		self.codes.get(&(tenant, code.to_owned())).copied()
	}
}

/// The uncommitted writes of a transaction.
#[derive(Default)]
struct Changes {
	records: HashMap<String, HashMap<Uuid, Record>>,
	inserted: HashSet<(String, Uuid)>,
	pro_numbers: HashMap<TenantId, ProNumberCounter>,
	master_keys: HashMap<TenantId, MasterKey>,
	entity_keys: HashMap<(TenantId, EntityKind), EntityKey>,
}

#[derive(Clone, Default)]
pub struct Datastore {
	state: Arc<RwLock<State>>,
	locks: Arc<Mutex<HashMap<String, RowLock>>>,
	/// How many upcoming commits fail with a retryable conflict
	#[cfg(test)]
	conflicts: Arc<AtomicU32>,
}

pub struct Transaction {
	/// Is the transaction complete?
	done: bool,
	/// Is the transaction writeable?
	write: bool,
	/// Should we check unhandled transactions?
	check: Check,
	/// The committed state of the store
	state: Arc<RwLock<State>>,
	/// The row locks of the store
	locks: Arc<Mutex<HashMap<String, RowLock>>>,
	/// The row locks held by this transaction
	guards: HashMap<String, OwnedMutexGuard<()>>,
	/// The writes of this transaction
	changes: Changes,
	#[cfg(test)]
	conflicts: Arc<AtomicU32>,
}

impl Drop for Transaction {
	fn drop(&mut self) {
		if !self.done && self.write {
			self.check.report("mem");
		}
		self.release();
	}
}

impl Datastore {
	/// Open a new database
	pub(crate) fn new() -> Datastore {
		Datastore::default()
	}

	/// Shutdown the database
	pub(crate) async fn shutdown(&self) -> Result<()> {
		// Nothing to do here
		Ok(())
	}

	/// Start a new transaction
	pub(crate) async fn transaction(&self, write: bool, _: LockType) -> Result<Transaction> {
		Ok(Transaction {
			done: false,
			write,
			check: Check::current(),
			state: self.state.clone(),
			locks: self.locks.clone(),
			guards: HashMap::new(),
			changes: Changes::default(),
			#[cfg(test)]
			conflicts: self.conflicts.clone(),
		})
	}

	/// Makes the next `n` commits fail with [`Error::TxRetryable`]
	#[cfg(test)]
	pub(crate) fn force_conflicts(&self, n: u32) {
		self.conflicts.store(n, Ordering::SeqCst);
	}

	/// The number of forced conflicts which were not raised yet
	#[cfg(test)]
	pub(crate) fn pending_conflicts(&self) -> u32 {
		self.conflicts.load(Ordering::SeqCst)
	}
}

impl Transaction {
	/// Waits for the row lock with the given name, unless it is already held
	async fn lock(&mut self, name: String) {
		if self.guards.contains_key(&name) {
			return;
		}
		let lock = self.locks.lock().entry(name.clone()).or_default().clone();
		let guard = lock.lock_owned().await;
		self.guards.insert(name, guard);
	}

	/// Releases everything this transaction holds
	fn finish(&mut self) {
		self.done = true;
		self.changes = Changes::default();
		self.release();
	}

	/// Drops the held row locks, and forgets every row lock which no
	/// transaction holds or waits for
	fn release(&mut self) {
		if self.guards.is_empty() {
			return;
		}
		self.guards.clear();
		self.locks.lock().retain(|_, lock| Arc::strong_count(lock) > 1);
	}

	/// Fetches a record as seen by this transaction
	fn record(&self, table: &str, id: Uuid) -> Option<Record> {
		if let Some(v) = self.changes.records.get(table).and_then(|t| t.get(&id)) {
			return Some(v.clone());
		}
		self.state.read().tables.get(table).and_then(|t| t.rows.get(&id)).cloned()
	}

	/// Finds the record owning a code as seen by this transaction
	fn owner(&self, table: &str, tenant: TenantId, code: &str) -> Option<Uuid> {
		let written = self.changes.records.get(table);
		if let Some(v) = written.and_then(|t| {
			t.values().find(|r| r.organization_id == tenant && r.code == code)
		}) {
			return Some(v.id);
		}
		let state = self.state.read();
		match state.tables.get(table).and_then(|t| t.owner(tenant, code)) {
			// A row rewritten in this transaction no longer owns its old code
			Some(id) if written.is_some_and(|t| t.contains_key(&id)) => None,
			v => v,
		}
	}
}

#[async_trait::async_trait]
impl Transactable for Transaction {
	fn kind(&self) -> &'static str {
		"memory"
	}

	fn closed(&self) -> bool {
		self.done
	}

	fn writeable(&self) -> bool {
		self.write
	}

	async fn cancel(&mut self) -> Result<()> {
		// Check to see if transaction is closed
		ensure!(!self.done, Error::TxFinished);
		// Discard all changes and locks
		self.finish();
		// Continue
		Ok(())
	}

	async fn commit(&mut self) -> Result<()> {
		// Check to see if transaction is closed
		ensure!(!self.done, Error::TxFinished);
		// Check to see if transaction is writable
		ensure!(self.write, Error::TxReadonly);
		#[cfg(test)]
		if self.conflicts.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
		{
			self.finish();
			return Err(Error::TxRetryable("forced conflict".to_owned()));
		}
		// Take the changes, the locks are released afterwards
		let changes = std::mem::take(&mut self.changes);
		let res = {
			let mut state = self.state.write();
			apply(&mut state, changes)
		};
		// Mark the transaction as done
		self.finish();
		res
	}

	async fn code_exists(&mut self, table: &str, tenant: TenantId, code: &str) -> Result<bool> {
		ensure!(!self.done, Error::TxFinished);
		Ok(self.owner(table, tenant, code).is_some())
	}

	async fn scan_codes(&mut self, table: &str) -> Result<Vec<CodeRow>> {
		ensure!(!self.done, Error::TxFinished);
		let written = self.changes.records.get(table);
		let mut out = Vec::new();
		if let Some(t) = self.state.read().tables.get(table) {
			for r in t.rows.values() {
				if written.is_some_and(|w| w.contains_key(&r.id)) {
					continue;
				}
				out.push(CodeRow {
					code: r.code.clone(),
					organization_id: r.organization_id,
				});
			}
		}
		for r in written.into_iter().flat_map(|w| w.values()) {
			out.push(CodeRow {
				code: r.code.clone(),
				organization_id: r.organization_id,
			});
		}
		Ok(out)
	}

	async fn insert_record(&mut self, table: &str, record: &Record) -> Result<()> {
		ensure!(!self.done, Error::TxFinished);
		ensure!(self.write, Error::TxReadonly);
		ensure!(self.record(table, record.id).is_none(), Error::TxKeyAlreadyExists);
		ensure!(
			self.owner(table, record.organization_id, &record.code).is_none(),
			Error::TxKeyAlreadyExists
		);
		self.changes.inserted.insert((table.to_owned(), record.id));
		self.changes.records.entry(table.to_owned()).or_default().insert(record.id, record.clone());
		Ok(())
	}

	async fn get_record(&mut self, table: &str, id: Uuid) -> Result<Option<Record>> {
		ensure!(!self.done, Error::TxFinished);
		Ok(self.record(table, id))
	}

	async fn update_versioned(
		&mut self,
		table: &str,
		record: &Record,
		expected: i64,
	) -> Result<Option<Record>> {
		ensure!(!self.done, Error::TxFinished);
		ensure!(self.write, Error::TxReadonly);
		// Wait for concurrent writers of this row to finish
		self.lock(format!("{table}:{}", record.id)).await;
		// Compare against the latest committed version
		match self.record(table, record.id) {
			Some(current) if current.version == expected => {
				if let Some(owner) = self.owner(table, record.organization_id, &record.code) {
					ensure!(owner == record.id, Error::TxKeyAlreadyExists);
				}
				let mut stored = record.clone();
				stored.created_at = current.created_at;
				self.changes
					.records
					.entry(table.to_owned())
					.or_default()
					.insert(stored.id, stored.clone());
				Ok(Some(stored))
			}
			_ => Ok(None),
		}
	}

	async fn lock_pro_number_counter(
		&mut self,
		tenant: TenantId,
		now: DateTime<Utc>,
	) -> Result<ProNumberCounter> {
		ensure!(!self.done, Error::TxFinished);
		ensure!(self.write, Error::TxReadonly);
		self.lock(format!("pro_number_counters:{tenant}")).await;
		if let Some(v) = self.changes.pro_numbers.get(&tenant) {
			return Ok(v.clone());
		}
		let existing = self.state.read().pro_numbers.get(&tenant).cloned();
		let counter = existing.unwrap_or_else(|| ProNumberCounter {
			id: Uuid::new_v4(),
			organization_id: tenant,
			last_used_number: 0,
			updated_at: now,
		});
		self.changes.pro_numbers.insert(tenant, counter.clone());
		Ok(counter)
	}

	async fn upsert_pro_number_counter(&mut self, counter: &ProNumberCounter) -> Result<()> {
		ensure!(!self.done, Error::TxFinished);
		ensure!(self.write, Error::TxReadonly);
		let entry = self.changes.pro_numbers.entry(counter.organization_id);
		match entry {
			std::collections::hash_map::Entry::Occupied(mut v) => {
				let v = v.get_mut();
				v.last_used_number = counter.last_used_number;
				v.updated_at = counter.updated_at;
			}
			std::collections::hash_map::Entry::Vacant(v) => {
				let existing = self.state.read().pro_numbers.get(&counter.organization_id).cloned();
				let mut stored = existing.unwrap_or_else(|| counter.clone());
				stored.last_used_number = counter.last_used_number;
				stored.updated_at = counter.updated_at;
				v.insert(stored);
			}
		}
		Ok(())
	}

	async fn get_master_key(&mut self, tenant: TenantId) -> Result<Option<MasterKey>> {
		ensure!(!self.done, Error::TxFinished);
		if let Some(v) = self.changes.master_keys.get(&tenant) {
			return Ok(Some(v.clone()));
		}
		Ok(self.state.read().master_keys.get(&tenant).cloned())
	}

	async fn put_master_key(&mut self, key: &MasterKey) -> Result<MasterKey> {
		ensure!(!self.done, Error::TxFinished);
		ensure!(self.write, Error::TxReadonly);
		self.lock(format!("master_key_generations:{}", key.organization_id)).await;
		if let Some(v) = self.get_master_key(key.organization_id).await? {
			return Ok(v);
		}
		self.changes.master_keys.insert(key.organization_id, key.clone());
		Ok(key.clone())
	}

	async fn get_entity_key(
		&mut self,
		tenant: TenantId,
		kind: EntityKind,
	) -> Result<Option<EntityKey>> {
		ensure!(!self.done, Error::TxFinished);
		if let Some(v) = self.changes.entity_keys.get(&(tenant, kind)) {
			return Ok(Some(v.clone()));
		}
		Ok(self.state.read().entity_keys.get(&(tenant, kind)).cloned())
	}

	async fn put_entity_key(&mut self, key: &EntityKey) -> Result<EntityKey> {
		ensure!(!self.done, Error::TxFinished);
		ensure!(self.write, Error::TxReadonly);
		self.lock(format!("entity_key_generations:{}:{}", key.organization_id, key.kind)).await;
		if let Some(v) = self.get_entity_key(key.organization_id, key.kind).await? {
			return Ok(v);
		}
		self.changes.entity_keys.insert((key.organization_id, key.kind), key.clone());
		Ok(key.clone())
	}

	async fn set_entity_key_pattern(
		&mut self,
		tenant: TenantId,
		kind: EntityKind,
		pattern: Pattern,
		now: DateTime<Utc>,
	) -> Result<bool> {
		ensure!(!self.done, Error::TxFinished);
		ensure!(self.write, Error::TxReadonly);
		self.lock(format!("entity_key_generations:{tenant}:{kind}")).await;
		let Some(mut key) = self.get_entity_key(tenant, kind).await? else {
			return Ok(false);
		};
		key.pattern = pattern;
		key.updated_at = now;
		self.changes.entity_keys.insert((tenant, kind), key);
		Ok(true)
	}
}

/// Applies the changes of a transaction to the committed state, unless
/// another transaction committed a conflicting record first.
fn apply(state: &mut State, changes: Changes) -> Result<()> {
	// Check every written record before changing anything
	for (table, rows) in &changes.records {
		let Some(t) = state.tables.get(table) else {
			continue;
		};
		for r in rows.values() {
			if changes.inserted.contains(&(table.clone(), r.id)) && t.rows.contains_key(&r.id) {
				return Err(Error::TxKeyAlreadyExists);
			}
			match t.owner(r.organization_id, &r.code) {
				Some(owner) if owner != r.id => return Err(Error::TxKeyAlreadyExists),
				_ => (),
			}
		}
	}
	// Write the records and their codes
	for (table, rows) in changes.records {
		let t = state.tables.entry(table).or_default();
		for (id, r) in rows {
			if let Some(old) = t.rows.get(&id) {
				t.codes.remove(&(old.organization_id, old.code.clone()));
			}
			t.codes.insert((r.organization_id, r.code.clone()), id);
			t.rows.insert(id, r);
		}
	}
	state.pro_numbers.extend(changes.pro_numbers);
	for (tenant, key) in changes.master_keys {
		state.master_keys.entry(tenant).or_insert(key);
	}
	state.entity_keys.extend(changes.entity_keys);
	Ok(())
}
