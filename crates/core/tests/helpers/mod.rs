#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use tenantcode_core::catalog::{Record, TenantId};
use tenantcode_core::ctx::{Context, MutableContext};
use tenantcode_core::err::Error;
use tenantcode_core::store::{Datastore, FakeClock, LockType, TransactionType};
use uuid::Uuid;

pub async fn new_ds() -> Result<Datastore, Error> {
	Datastore::new("memory").await
}

pub fn background() -> Context {
	MutableContext::background().freeze()
}

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
	Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

pub fn fake_clock(at: DateTime<Utc>) -> FakeClock {
	FakeClock::new(at)
}

/// Stores records with the given codes, bypassing code generation
pub async fn seed_codes(
	ds: &Datastore,
	table: &str,
	tenant: TenantId,
	codes: &[&str],
) -> Result<(), Error> {
	let tx = ds.transaction(TransactionType::Write, LockType::Optimistic).await?;
	for code in codes {
		let now = ds.clock().now();
		let record = Record {
			id: Uuid::new_v4(),
			organization_id: tenant,
			code: (*code).to_owned(),
			version: 0,
			data: serde_json::json!({}),
			created_at: now,
			updated_at: now,
		};
		tx.insert_record(table, &record).await?;
	}
	tx.commit().await
}

/// Sets the durable pro number counter of a tenant
pub async fn set_last_used_number(ds: &Datastore, tenant: TenantId, n: i64) -> Result<(), Error> {
	let tx = ds.transaction(TransactionType::Write, LockType::Pessimistic).await?;
	let mut counter = tx.lock_pro_number_counter(tenant).await?;
	counter.last_used_number = n;
	tx.upsert_pro_number_counter(&counter).await?;
	tx.commit().await
}
