//! Key generation records.
//!
//! Every tenant owns one master key, and one key per kind of entity. The
//! entity key holds the pattern new codes of that kind are derived from.

use uuid::Uuid;

use crate::catalog::{EntityKey, EntityKind, MasterKey, TenantId};
use crate::code::Pattern;
use crate::err::{Error, Result};
use crate::store::Transaction;

const TARGET: &str = "tenantcode::core::keygen";

/// Returns the master key of a tenant, creating it when missing.
#[instrument(level = "trace", target = "tenantcode::core::keygen", skip(tx))]
pub async fn ensure_master_key(tx: &Transaction, tenant: TenantId) -> Result<MasterKey> {
	if let Some(v) = tx.get_master_key(tenant).await? {
		return Ok(v);
	}
	let key = MasterKey {
		id: Uuid::new_v4(),
		organization_id: tenant,
		created_at: tx.now(),
	};
	let key = tx.put_master_key(&key).await?;
	debug!(target: TARGET, %tenant, "Created master key");
	Ok(key)
}

/// Returns the key of an entity kind within a tenant, creating it with the
/// default pattern of the kind when missing.
#[instrument(level = "trace", target = "tenantcode::core::keygen", skip(tx))]
pub async fn ensure_entity_key(
	tx: &Transaction,
	tenant: TenantId,
	kind: EntityKind,
) -> Result<EntityKey> {
	if let Some(v) = tx.get_entity_key(tenant, kind).await? {
		return Ok(v);
	}
	let master = ensure_master_key(tx, tenant).await?;
	let now = tx.now();
	let key = EntityKey {
		id: Uuid::new_v4(),
		master_key_id: master.id,
		organization_id: tenant,
		kind,
		pattern: kind.default_pattern(),
		created_at: now,
		updated_at: now,
	};
	let key = tx.put_entity_key(&key).await?;
	debug!(target: TARGET, %tenant, %kind, pattern = %key.pattern, "Created entity key");
	Ok(key)
}

/// Creates the master key and the key of every entity kind of a tenant.
pub async fn ensure_all(tx: &Transaction, tenant: TenantId) -> Result<Vec<EntityKey>> {
	ensure_master_key(tx, tenant).await?;
	let mut out = Vec::with_capacity(EntityKind::ALL.len());
	for kind in EntityKind::ALL {
		out.push(ensure_entity_key(tx, tenant, kind).await?);
	}
	Ok(out)
}

/// The pattern codes of an entity kind are currently derived from. Kinds
/// without a key record use their default pattern.
pub async fn active_pattern(tx: &Transaction, tenant: TenantId, kind: EntityKind) -> Result<Pattern> {
	Ok(match tx.get_entity_key(tenant, kind).await? {
		Some(key) => key.pattern,
		None => kind.default_pattern(),
	})
}

/// Changes the pattern new codes of an entity kind are derived from.
#[instrument(level = "trace", target = "tenantcode::core::keygen", skip(tx))]
pub async fn set_pattern(
	tx: &Transaction,
	tenant: TenantId,
	kind: EntityKind,
	pattern: &str,
) -> Result<EntityKey> {
	let pattern = match Pattern::parse(pattern) {
		Some(p) if kind.supports(p) => p,
		_ => {
			return Err(Error::InvalidPattern {
				kind,
				pattern: pattern.to_owned(),
			});
		}
	};
	ensure_entity_key(tx, tenant, kind).await?;
	if !tx.set_entity_key_pattern(tenant, kind, pattern).await? {
		fail!("Key of {kind} in tenant {tenant} is missing after it was ensured");
	}
	match tx.get_entity_key(tenant, kind).await? {
		Some(v) => Ok(v),
		None => fail!("Key of {kind} in tenant {tenant} is missing after it was updated"),
	}
}
