//! This module defines the API for a transaction in a durable store.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::catalog::{CodeRow, EntityKey, EntityKind, MasterKey, ProNumberCounter, Record, TenantId};
use crate::code::Pattern;
use crate::err::Result;

macro_rules! ensure {
	($cond:expr, $err:expr $(,)?) => {
		if !$cond {
			return Err($err);
		}
	};
}

pub(super) use ensure;

/// This trait defines the API for a transaction in a durable store.
///
/// Table names passed to these functions have already been validated
/// by [`super::Transaction`].
#[allow(dead_code, reason = "Not used when none of the storage backends are enabled.")]
#[async_trait::async_trait]
pub trait Transactable: Send + Sync {
	/// Get the name of the transaction type.
	fn kind(&self) -> &'static str;

	/// Check if transaction is finished.
	///
	/// If the transaction has been cancelled or committed,
	/// then this function will return [`true`], and any further
	/// calls to functions on this transaction will result
	/// in a [`crate::err::Error::TxFinished`] error.
	fn closed(&self) -> bool;

	/// Check if transaction is writeable.
	fn writeable(&self) -> bool;

	/// Cancel a transaction.
	///
	/// This reverses all changes made within the transaction,
	/// and releases every row lock it holds.
	async fn cancel(&mut self) -> Result<()>;

	/// Commit a transaction.
	///
	/// This attempts to commit all changes made within the transaction,
	/// and releases every row lock it holds.
	async fn commit(&mut self) -> Result<()>;

	/// Check if a code exists for a tenant, including codes written
	/// earlier in this transaction.
	async fn code_exists(&mut self, table: &str, tenant: TenantId, code: &str) -> Result<bool>;

	/// Fetch the code and tenant of every record in a table.
	async fn scan_codes(&mut self, table: &str) -> Result<Vec<CodeRow>>;

	/// Insert a new record, failing with
	/// [`crate::err::Error::TxKeyAlreadyExists`] if its id or its code
	/// within the tenant is already taken.
	async fn insert_record(&mut self, table: &str, record: &Record) -> Result<()>;

	/// Fetch a record by id.
	async fn get_record(&mut self, table: &str, id: Uuid) -> Result<Option<Record>>;

	/// Replace a record if its stored version still equals `expected`.
	///
	/// The row stays locked until the transaction finishes. Returns the
	/// stored record, or [`None`] if no row matched.
	async fn update_versioned(
		&mut self,
		table: &str,
		record: &Record,
		expected: i64,
	) -> Result<Option<Record>>;

	/// Lock the pro number counter of a tenant until the transaction
	/// finishes, creating it with a zero value when it does not exist.
	async fn lock_pro_number_counter(
		&mut self,
		tenant: TenantId,
		now: DateTime<Utc>,
	) -> Result<ProNumberCounter>;

	/// Insert a pro number counter, or update the value and timestamp of
	/// the existing counter of the same tenant.
	async fn upsert_pro_number_counter(&mut self, counter: &ProNumberCounter) -> Result<()>;

	/// Fetch the master key of a tenant.
	async fn get_master_key(&mut self, tenant: TenantId) -> Result<Option<MasterKey>>;

	/// Insert a master key unless the tenant already has one. Returns the
	/// master key which is stored afterwards.
	async fn put_master_key(&mut self, key: &MasterKey) -> Result<MasterKey>;

	/// Fetch the key record of an entity kind within a tenant.
	async fn get_entity_key(
		&mut self,
		tenant: TenantId,
		kind: EntityKind,
	) -> Result<Option<EntityKey>>;

	/// Insert an entity key unless the tenant already has one for the
	/// same kind. Returns the entity key which is stored afterwards.
	async fn put_entity_key(&mut self, key: &EntityKey) -> Result<EntityKey>;

	/// Change the active pattern of an entity key. Returns [`false`] when
	/// the key does not exist.
	async fn set_entity_key_pattern(
		&mut self,
		tenant: TenantId,
		kind: EntityKind,
		pattern: Pattern,
		now: DateTime<Utc>,
	) -> Result<bool>;
}
