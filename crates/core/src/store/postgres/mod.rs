#![cfg(feature = "store-postgres")]

use std::ops::DerefMut;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::catalog::{CodeRow, EntityKey, EntityKind, MasterKey, ProNumberCounter, Record, TenantId};
use crate::code::Pattern;
use crate::err::{Error, Result};
use crate::options::EngineOptions;
use crate::store::api::{Transactable, ensure};
use crate::store::{Check, LockType};

/// The tables the store needs, created when the datastore starts.
const SCHEMA: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS pro_number_counters (
		id uuid PRIMARY KEY NOT NULL,
		organization_id uuid NOT NULL UNIQUE,
		last_used_number bigint NOT NULL,
		updated_at timestamptz NOT NULL
	);
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS master_key_generations (
		id uuid PRIMARY KEY NOT NULL,
		organization_id uuid NOT NULL UNIQUE,
		created_at timestamptz NOT NULL
	);
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS entity_key_generations (
		id uuid PRIMARY KEY NOT NULL,
		master_key_id uuid NOT NULL REFERENCES master_key_generations (id),
		organization_id uuid NOT NULL,
		kind text NOT NULL,
		pattern text NOT NULL,
		created_at timestamptz NOT NULL,
		updated_at timestamptz NOT NULL,
		UNIQUE (organization_id, kind)
	);
	"#,
];

/// The columns selected for every entity record.
const RECORD_COLUMNS: &str = "id, organization_id, code, version, data, created_at, updated_at";

fn entity_table(table: &str) -> String {
	format!(
		r#"
		CREATE TABLE IF NOT EXISTS {table} (
			id uuid PRIMARY KEY NOT NULL,
			organization_id uuid NOT NULL,
			code varchar(10) NOT NULL,
			version bigint NOT NULL DEFAULT 0,
			data jsonb NOT NULL DEFAULT '{{}}',
			created_at timestamptz NOT NULL,
			updated_at timestamptz NOT NULL,
			UNIQUE (organization_id, code)
		);
		"#
	)
}

#[derive(Clone)]
pub struct Datastore {
	pool: PgPool,
}

pub struct Transaction {
	/// Is the transaction writeable?
	write: bool,
	/// Should we check unhandled transactions?
	check: Check,
	/// The underlying datastore transaction
	inner: Option<sqlx::Transaction<'static, sqlx::Postgres>>,
}

impl Drop for Transaction {
	fn drop(&mut self) {
		// The sqlx transaction rolls back when dropped
		if self.inner.is_some() && self.write {
			self.check.report("postgres");
		}
	}
}

impl Datastore {
	/// Open a new database
	pub(crate) async fn new(path: &str, opts: &EngineOptions) -> Result<Datastore> {
		let pool = PgPoolOptions::new()
			.max_connections(opts.max_connections)
			.acquire_timeout(opts.acquire_timeout)
			.connect(path)
			.await?;
		for statement in SCHEMA {
			sqlx::query(statement).execute(&pool).await?;
		}
		for kind in EntityKind::ALL {
			sqlx::query(&entity_table(kind.table())).execute(&pool).await.map_err(|e| {
				Error::from(e).on_table(kind.table())
			})?;
		}
		Ok(Self {
			pool,
		})
	}

	/// Shutdown the database
	pub(crate) async fn shutdown(&self) -> Result<()> {
		self.pool.close().await;
		Ok(())
	}

	/// Start a new transaction
	pub(crate) async fn transaction(&self, write: bool, lock: LockType) -> Result<Transaction> {
		let mut tx = self.pool.begin().await?;
		if lock == LockType::Optimistic {
			sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
				.execute(tx.deref_mut())
				.await?;
		}
		if !write {
			sqlx::query("SET TRANSACTION READ ONLY").execute(tx.deref_mut()).await?;
		}
		Ok(Transaction {
			write,
			check: Check::current(),
			inner: Some(tx),
		})
	}
}

#[async_trait::async_trait]
impl Transactable for Transaction {
	fn kind(&self) -> &'static str {
		"postgres"
	}

	fn closed(&self) -> bool {
		self.inner.is_none()
	}

	fn writeable(&self) -> bool {
		self.write
	}

	async fn cancel(&mut self) -> Result<()> {
		self.inner.take().ok_or(Error::TxFinished)?.rollback().await.map_err(Into::into)
	}

	async fn commit(&mut self) -> Result<()> {
		// If the transaction is already closed or is read-only, return an error.
		ensure!(!self.closed(), Error::TxFinished);
		ensure!(self.write, Error::TxReadonly);
		self.inner.take().ok_or(Error::TxFinished)?.commit().await.map_err(Into::into)
	}

	async fn code_exists(&mut self, table: &str, tenant: TenantId, code: &str) -> Result<bool> {
		let tx = self.inner.as_mut().ok_or(Error::TxFinished)?.deref_mut();
		let sql =
			format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE organization_id = $1 AND code = $2)");
		Ok(sqlx::query_scalar(&sql).bind(tenant).bind(code).fetch_one(tx).await?)
	}

	async fn scan_codes(&mut self, table: &str) -> Result<Vec<CodeRow>> {
		let tx = self.inner.as_mut().ok_or(Error::TxFinished)?.deref_mut();
		let sql = format!("SELECT code, organization_id FROM {table}");
		Ok(sqlx::query_as(&sql).fetch_all(tx).await?)
	}

	async fn insert_record(&mut self, table: &str, record: &Record) -> Result<()> {
		ensure!(self.write, Error::TxReadonly);
		let tx = self.inner.as_mut().ok_or(Error::TxFinished)?.deref_mut();
		let sql = format!(
			"INSERT INTO {table} ({RECORD_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
		);
		sqlx::query(&sql)
			.bind(record.id)
			.bind(record.organization_id)
			.bind(&record.code)
			.bind(record.version)
			.bind(&record.data)
			.bind(record.created_at)
			.bind(record.updated_at)
			.execute(tx)
			.await?;
		Ok(())
	}

	async fn get_record(&mut self, table: &str, id: Uuid) -> Result<Option<Record>> {
		let tx = self.inner.as_mut().ok_or(Error::TxFinished)?.deref_mut();
		let sql = format!("SELECT {RECORD_COLUMNS} FROM {table} WHERE id = $1");
		Ok(sqlx::query_as(&sql).bind(id).fetch_optional(tx).await?)
	}

	async fn update_versioned(
		&mut self,
		table: &str,
		record: &Record,
		expected: i64,
	) -> Result<Option<Record>> {
		ensure!(self.write, Error::TxReadonly);
		let tx = self.inner.as_mut().ok_or(Error::TxFinished)?.deref_mut();
		let sql = format!(
			"UPDATE {table} SET code = $1, version = $2, data = $3, updated_at = $4 \
			WHERE id = $5 AND version = $6 RETURNING {RECORD_COLUMNS}"
		);
		Ok(sqlx::query_as(&sql)
			.bind(&record.code)
			.bind(record.version)
			.bind(&record.data)
			.bind(record.updated_at)
			.bind(record.id)
			.bind(expected)
			.fetch_optional(tx)
			.await?)
	}

	async fn lock_pro_number_counter(
		&mut self,
		tenant: TenantId,
		now: DateTime<Utc>,
	) -> Result<ProNumberCounter> {
		ensure!(self.write, Error::TxReadonly);
		let tx = self.inner.as_mut().ok_or(Error::TxFinished)?;
		sqlx::query(
			"INSERT INTO pro_number_counters (id, organization_id, last_used_number, updated_at) \
			VALUES ($1, $2, 0, $3) ON CONFLICT (organization_id) DO NOTHING",
		)
		.bind(Uuid::new_v4())
		.bind(tenant)
		.bind(now)
		.execute(tx.deref_mut())
		.await?;
		Ok(sqlx::query_as(
			"SELECT id, organization_id, last_used_number, updated_at \
			FROM pro_number_counters WHERE organization_id = $1 FOR UPDATE",
		)
		.bind(tenant)
		.fetch_one(tx.deref_mut())
		.await?)
	}

	async fn upsert_pro_number_counter(&mut self, counter: &ProNumberCounter) -> Result<()> {
		ensure!(self.write, Error::TxReadonly);
		let tx = self.inner.as_mut().ok_or(Error::TxFinished)?.deref_mut();
		sqlx::query(
			"INSERT INTO pro_number_counters (id, organization_id, last_used_number, updated_at) \
			VALUES ($1, $2, $3, $4) ON CONFLICT (organization_id) DO UPDATE \
			SET last_used_number = EXCLUDED.last_used_number, updated_at = EXCLUDED.updated_at",
		)
		.bind(counter.id)
		.bind(counter.organization_id)
		.bind(counter.last_used_number)
		.bind(counter.updated_at)
		.execute(tx)
		.await?;
		Ok(())
	}

	async fn get_master_key(&mut self, tenant: TenantId) -> Result<Option<MasterKey>> {
		let tx = self.inner.as_mut().ok_or(Error::TxFinished)?.deref_mut();
		Ok(sqlx::query_as(
			"SELECT id, organization_id, created_at FROM master_key_generations \
			WHERE organization_id = $1",
		)
		.bind(tenant)
		.fetch_optional(tx)
		.await?)
	}

	async fn put_master_key(&mut self, key: &MasterKey) -> Result<MasterKey> {
		ensure!(self.write, Error::TxReadonly);
		let tx = self.inner.as_mut().ok_or(Error::TxFinished)?;
		sqlx::query(
			"INSERT INTO master_key_generations (id, organization_id, created_at) \
			VALUES ($1, $2, $3) ON CONFLICT (organization_id) DO NOTHING",
		)
		.bind(key.id)
		.bind(key.organization_id)
		.bind(key.created_at)
		.execute(tx.deref_mut())
		.await?;
		match self.get_master_key(key.organization_id).await? {
			Some(v) => Ok(v),
			None => fail!("Master key of tenant {} is missing after insert", key.organization_id),
		}
	}

	async fn get_entity_key(
		&mut self,
		tenant: TenantId,
		kind: EntityKind,
	) -> Result<Option<EntityKey>> {
		let tx = self.inner.as_mut().ok_or(Error::TxFinished)?.deref_mut();
		let row: Option<(Uuid, Uuid, String, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
			"SELECT id, master_key_id, pattern, created_at, updated_at \
			FROM entity_key_generations WHERE organization_id = $1 AND kind = $2",
		)
		.bind(tenant)
		.bind(kind.as_str())
		.fetch_optional(tx)
		.await?;
		Ok(row.map(|(id, master_key_id, pattern, created_at, updated_at)| EntityKey {
			id,
			master_key_id,
			organization_id: tenant,
			kind,
			pattern: kind.resolve(&pattern),
			created_at,
			updated_at,
		}))
	}

	async fn put_entity_key(&mut self, key: &EntityKey) -> Result<EntityKey> {
		ensure!(self.write, Error::TxReadonly);
		let tx = self.inner.as_mut().ok_or(Error::TxFinished)?;
		sqlx::query(
			"INSERT INTO entity_key_generations \
			(id, master_key_id, organization_id, kind, pattern, created_at, updated_at) \
			VALUES ($1, $2, $3, $4, $5, $6, $7) ON CONFLICT (organization_id, kind) DO NOTHING",
		)
		.bind(key.id)
		.bind(key.master_key_id)
		.bind(key.organization_id)
		.bind(key.kind.as_str())
		.bind(key.pattern.as_str())
		.bind(key.created_at)
		.bind(key.updated_at)
		.execute(tx.deref_mut())
		.await?;
		match self.get_entity_key(key.organization_id, key.kind).await? {
			Some(v) => Ok(v),
			None => fail!("Key of {} in tenant {} is missing after insert", key.kind, key.organization_id),
		}
	}

	async fn set_entity_key_pattern(
		&mut self,
		tenant: TenantId,
		kind: EntityKind,
		pattern: Pattern,
		now: DateTime<Utc>,
	) -> Result<bool> {
		ensure!(self.write, Error::TxReadonly);
		let tx = self.inner.as_mut().ok_or(Error::TxFinished)?.deref_mut();
		let res = sqlx::query(
			"UPDATE entity_key_generations SET pattern = $1, updated_at = $2 \
			WHERE organization_id = $3 AND kind = $4",
		)
		.bind(pattern.as_str())
		.bind(now)
		.bind(tenant)
		.bind(kind.as_str())
		.execute(tx)
		.await?;
		Ok(res.rows_affected() > 0)
	}
}
