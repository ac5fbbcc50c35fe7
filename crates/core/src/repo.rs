//! Record writes which involve code generation or version checks.
//!
//! Timestamps are stamped here from the datastore clock, and `version`
//! is only ever written by [`optimistic_update`].

use serde::Serialize;
use uuid::Uuid;

use crate::catalog::{Record, TenantId};
use crate::code::{CodeGenerator, Entity};
use crate::ctx::Context;
use crate::err::{Error, Result};
use crate::keygen;
use crate::store::{Datastore, LockType, Transaction, TransactionType};

/// Inserts a new record with a generated code, within the caller's
/// transaction.
///
/// The code is derived with the active pattern of the tenant. If another
/// writer commits the same code first, the insert or the commit fails with
/// [`Error::TxKeyAlreadyExists`].
#[instrument(level = "trace", target = "tenantcode::core::repo", skip_all, fields(table = entity.table_identifier(), tenant = %tenant))]
pub async fn insert_with_code<E>(
	ctx: &Context,
	tx: &Transaction,
	generator: &CodeGenerator,
	entity: &E,
	tenant: TenantId,
) -> Result<Record>
where
	E: Entity + Serialize + ?Sized,
{
	let table = entity.table_identifier();
	let pattern = ctx.run(keygen::active_pattern(tx, tenant, entity.kind())).await?;
	let code = generator.generate_unique(ctx, tx, entity, pattern.as_str(), tenant).await?;
	let now = tx.now();
	let record = Record {
		id: Uuid::new_v4(),
		organization_id: tenant,
		code,
		version: 0,
		data: serde_json::to_value(entity)?,
		created_at: now,
		updated_at: now,
	};
	ctx.run(tx.insert_record(table, &record)).await.map_err(|e| e.on_table(table))?;
	Ok(record)
}

/// Inserts a new record with a generated code in its own transaction.
///
/// The transaction reads committed rows, so the uniqueness checks see
/// codes committed by other writers while the code is generated. The
/// collision budget comes from the datastore options.
pub async fn insert<E>(
	ctx: &Context,
	ds: &Datastore,
	generator: &CodeGenerator,
	entity: &E,
	tenant: TenantId,
) -> Result<Record>
where
	E: Entity + Serialize + ?Sized,
{
	let generator = generator.clone().with_options(ds.options());
	let tx = ds.transaction(TransactionType::Write, LockType::Pessimistic).await?;
	let res = insert_with_code(ctx, &tx, &generator, entity, tenant).await;
	run!(tx, res)
}

/// Fetches a record by id.
pub async fn get(ctx: &Context, tx: &Transaction, table: &str, id: Uuid) -> Result<Option<Record>> {
	ctx.run(tx.get_record(table, id)).await.map_err(|e| e.on_table(table))
}

/// Writes a record if nobody else updated it since it was read.
///
/// The version of the record is incremented before the write, and the
/// write only matches the row if its stored version is still the version
/// the record was read at. On success the record holds the stored row.
/// On failure the record is left as it was, and a row which moved on
/// reports [`Error::VersionConflict`].
#[instrument(level = "trace", target = "tenantcode::core::repo", skip_all, fields(table = table, id = %record.id))]
pub async fn optimistic_update(
	ctx: &Context,
	tx: &Transaction,
	table: &str,
	record: &mut Record,
) -> Result<()> {
	let version = record.version;
	let updated_at = record.updated_at;
	record.version = version + 1;
	record.updated_at = tx.now();
	let res = match ctx.run(tx.update_versioned(table, record, version)).await {
		Ok(Some(stored)) => {
			*record = stored;
			return Ok(());
		}
		// The row moved on, or a concurrent writer of it won
		Ok(None) | Err(Error::TxRetryable(_)) => Err(Error::VersionConflict {
			id: record.id,
			version,
		}),
		Err(e) => Err(e.on_table(table)),
	};
	record.version = version;
	record.updated_at = updated_at;
	res
}

/// Runs [`optimistic_update`] in its own transaction, and commits it.
///
/// The transaction reads committed rows, so a writer which waited on the
/// row lock of a concurrent update sees the new version and conflicts.
pub async fn update(ctx: &Context, ds: &Datastore, table: &str, record: &mut Record) -> Result<()> {
	let tx = ds.transaction(TransactionType::Write, LockType::Pessimistic).await?;
	let version = record.version;
	let updated_at = record.updated_at;
	let res = optimistic_update(ctx, &tx, table, record).await;
	let res = run!(tx, res);
	if res.is_err() {
		record.version = version;
		record.updated_at = updated_at;
	}
	res
}
