use async_trait::async_trait;

use crate::catalog::TenantId;
use crate::err::Result;
use crate::store::Transaction;

/// Answers whether a candidate code is already stored for a tenant.
///
/// Implementations must observe every committed row, and the uncommitted
/// rows of the calling transaction. Transport faults are reported as
/// [`crate::err::Error::StoreUnavailable`].
#[async_trait]
pub trait UniquenessChecker: Send + Sync {
	async fn exists(&self, table: &str, code: &str, tenant: TenantId) -> Result<bool>;
}

#[async_trait]
impl UniquenessChecker for Transaction {
	async fn exists(&self, table: &str, code: &str, tenant: TenantId) -> Result<bool> {
		self.code_exists(table, tenant, code).await.map_err(|e| e.on_table(table))
	}
}
