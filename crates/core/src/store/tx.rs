use chrono::{DateTime, Utc};
use futures::lock::{Mutex, MutexGuard};
use uuid::Uuid;

use super::api::Transactable;
use super::clock::SizedClock;
use crate::catalog::{
	self, CodeRow, EntityKey, EntityKind, MasterKey, ProNumberCounter, Record, TenantId,
};
use crate::code::Pattern;
use crate::err::Result;

/// A transaction against the durable store.
///
/// Every function takes `&self`, so the transaction can be shared by the
/// code generator, the uniqueness checker and the repository layer within
/// a single unit of work.
pub struct Transaction {
	/// Is this transaction writeable?
	write: bool,
	/// The clock used to stamp rows
	clock: SizedClock,
	/// The underlying backend transaction
	tx: Mutex<Box<dyn Transactable>>,
}

impl Transaction {
	/// Create a new transaction
	pub(crate) fn new(write: bool, clock: SizedClock, tx: Box<dyn Transactable>) -> Transaction {
		Transaction {
			write,
			clock,
			tx: Mutex::new(tx),
		}
	}

	/// Retrieve the underlying transaction
	async fn lock(&self) -> MutexGuard<'_, Box<dyn Transactable>> {
		self.tx.lock().await
	}

	/// Check if the transaction is writeable
	pub fn writeable(&self) -> bool {
		self.write
	}

	/// The current time of the datastore clock
	pub fn now(&self) -> DateTime<Utc> {
		self.clock.now()
	}

	/// Check if the transaction is finished.
	///
	/// If the transaction has been canceled or committed,
	/// then this function will return [`true`], and any further
	/// calls to functions on this transaction will result
	/// in a [`crate::err::Error::TxFinished`] error.
	pub async fn closed(&self) -> bool {
		self.lock().await.closed()
	}

	/// Cancel a transaction.
	///
	/// This reverses all changes made within the transaction.
	#[instrument(level = "trace", target = "tenantcode::core::store::tx", skip_all)]
	pub async fn cancel(&self) -> Result<()> {
		self.lock().await.cancel().await
	}

	/// Commit a transaction.
	///
	/// This attempts to commit all changes made within the transaction.
	#[instrument(level = "trace", target = "tenantcode::core::store::tx", skip_all)]
	pub async fn commit(&self) -> Result<()> {
		self.lock().await.commit().await
	}

	/// Check if a code exists for a tenant in a table.
	#[instrument(level = "trace", target = "tenantcode::core::store::tx", skip(self))]
	pub async fn code_exists(&self, table: &str, tenant: TenantId, code: &str) -> Result<bool> {
		let table = catalog::validate_table(table)?;
		self.lock().await.code_exists(table, tenant, code).await
	}

	/// Fetch the code and tenant of every record in a table.
	#[instrument(level = "trace", target = "tenantcode::core::store::tx", skip(self))]
	pub async fn scan_codes(&self, table: &str) -> Result<Vec<CodeRow>> {
		let table = catalog::validate_table(table)?;
		self.lock().await.scan_codes(table).await
	}

	/// Insert a new record into a table.
	#[instrument(level = "trace", target = "tenantcode::core::store::tx", skip(self, record), fields(id = %record.id))]
	pub async fn insert_record(&self, table: &str, record: &Record) -> Result<()> {
		let table = catalog::validate_table(table)?;
		self.lock().await.insert_record(table, record).await
	}

	/// Fetch a record from a table.
	#[instrument(level = "trace", target = "tenantcode::core::store::tx", skip(self))]
	pub async fn get_record(&self, table: &str, id: Uuid) -> Result<Option<Record>> {
		let table = catalog::validate_table(table)?;
		self.lock().await.get_record(table, id).await
	}

	/// Replace a record if its stored version equals `expected`.
	#[instrument(level = "trace", target = "tenantcode::core::store::tx", skip(self, record), fields(id = %record.id))]
	pub async fn update_versioned(
		&self,
		table: &str,
		record: &Record,
		expected: i64,
	) -> Result<Option<Record>> {
		let table = catalog::validate_table(table)?;
		self.lock().await.update_versioned(table, record, expected).await
	}

	/// Lock the pro number counter of a tenant, creating it when missing.
	#[instrument(level = "trace", target = "tenantcode::core::store::tx", skip(self))]
	pub async fn lock_pro_number_counter(&self, tenant: TenantId) -> Result<ProNumberCounter> {
		let now = self.now();
		self.lock().await.lock_pro_number_counter(tenant, now).await
	}

	/// Insert or update the pro number counter of a tenant.
	#[instrument(level = "trace", target = "tenantcode::core::store::tx", skip_all)]
	pub async fn upsert_pro_number_counter(&self, counter: &ProNumberCounter) -> Result<()> {
		self.lock().await.upsert_pro_number_counter(counter).await
	}

	#[instrument(level = "trace", target = "tenantcode::core::store::tx", skip(self))]
	pub async fn get_master_key(&self, tenant: TenantId) -> Result<Option<MasterKey>> {
		self.lock().await.get_master_key(tenant).await
	}

	#[instrument(level = "trace", target = "tenantcode::core::store::tx", skip_all)]
	pub async fn put_master_key(&self, key: &MasterKey) -> Result<MasterKey> {
		self.lock().await.put_master_key(key).await
	}

	#[instrument(level = "trace", target = "tenantcode::core::store::tx", skip(self))]
	pub async fn get_entity_key(
		&self,
		tenant: TenantId,
		kind: EntityKind,
	) -> Result<Option<EntityKey>> {
		self.lock().await.get_entity_key(tenant, kind).await
	}

	#[instrument(level = "trace", target = "tenantcode::core::store::tx", skip_all)]
	pub async fn put_entity_key(&self, key: &EntityKey) -> Result<EntityKey> {
		self.lock().await.put_entity_key(key).await
	}

	#[instrument(level = "trace", target = "tenantcode::core::store::tx", skip(self))]
	pub async fn set_entity_key_pattern(
		&self,
		tenant: TenantId,
		kind: EntityKind,
		pattern: Pattern,
	) -> Result<bool> {
		let now = self.now();
		self.lock().await.set_entity_key_pattern(tenant, kind, pattern, now).await
	}
}
