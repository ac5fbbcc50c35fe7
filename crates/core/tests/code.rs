mod helpers;

use std::collections::HashSet;
use std::sync::Arc;

use helpers::*;
use tenantcode_core::catalog::{EntityKind, TenantId};
use tenantcode_core::code::{CodeGenerator, Counters, CustomerCode, Initializer, WorkerCode};
use tenantcode_core::ctx::MutableContext;
use tenantcode_core::err::Error;
use tenantcode_core::keygen;
use tenantcode_core::model::{Customer, Worker, WorkerType};
use tenantcode_core::repo;
use tenantcode_core::store::{LockType, TransactionType};

fn doe() -> Worker {
	Worker {
		first_name: "Jane".into(),
		last_name: "Doe".into(),
		worker_type: WorkerType::Employee,
	}
}

#[test_log::test(tokio::test)]
async fn worker_codes_continue_from_the_last_counter() -> Result<(), Error> {
	let ds = new_ds().await?;
	let ctx = background();
	let counters = Arc::new(Counters::new());
	let generator = CodeGenerator::new(counters.clone());
	let tenant = TenantId::new();
	// Select the last name pattern for workers
	let tx = ds.transaction(TransactionType::Write, LockType::Optimistic).await?;
	keygen::ensure_all(&tx, tenant).await?;
	keygen::set_pattern(&tx, tenant, EntityKind::Worker, "LASTNAME-COUNTER").await?;
	tx.commit().await?;
	// First worker insert
	let w = doe();
	let first = repo::insert(&ctx, &ds, &generator, &WorkerCode(&w), tenant).await?;
	assert_eq!(first.code, "DOE0001   ");
	assert_eq!(counters.get("workers", tenant, "DOE "), 1);
	// Second worker insert, same prefix
	let second = repo::insert(&ctx, &ds, &generator, &WorkerCode(&w), tenant).await?;
	assert_eq!(second.code, "DOE0002   ");
	assert_eq!(counters.get("workers", tenant, "DOE "), 2);
	// Another tenant has its own counters
	let other = repo::insert(&ctx, &ds, &generator, &WorkerCode(&w), TenantId::new()).await?;
	assert_eq!(other.code, "EDOE0001  ");
	Ok(())
}

#[test_log::test(tokio::test)]
async fn initializer_seeds_counters_from_stored_codes() -> Result<(), Error> {
	let ds = new_ds().await?;
	let ctx = background();
	let tenant = TenantId::new();
	seed_codes(&ds, "customers", tenant, &["TARG0005", "TARG0002", "BESTX0001"]).await?;
	let counters = Arc::new(Counters::new());
	let initializer = Initializer::new(counters.clone());
	initializer.run(&ctx, &ds, &["workers", "customers", "locations"]).await?;
	assert_eq!(counters.get("customers", tenant, "TARG"), 5);
	assert_eq!(counters.get("customers", tenant, "BEST"), 1);
	// Running again over the same rows changes nothing
	let snapshot = counters.snapshot();
	initializer.run(&ctx, &ds, &["workers", "customers", "locations"]).await?;
	assert_eq!(counters.snapshot(), snapshot);
	// New codes continue after the stored ones
	let generator = CodeGenerator::new(counters.clone());
	let c = Customer {
		name: "Target".into(),
		city: "Minneapolis".into(),
	};
	let record = repo::insert(&ctx, &ds, &generator, &CustomerCode(&c), tenant).await?;
	assert_eq!(record.code, "TARG0006  ");
	Ok(())
}

#[test_log::test(tokio::test)]
async fn initializer_rejects_short_codes_without_seeding() -> Result<(), Error> {
	let ds = new_ds().await?;
	let ctx = background();
	let tenant = TenantId::new();
	seed_codes(&ds, "customers", tenant, &["TARG0005"]).await?;
	seed_codes(&ds, "locations", tenant, &["ABC"]).await?;
	let counters = Arc::new(Counters::new());
	let res = Initializer::new(counters.clone()).run(&ctx, &ds, &["customers", "locations"]).await;
	match res {
		Err(Error::MalformedCode {
			table,
			code,
		}) => {
			assert_eq!(table, "locations");
			assert_eq!(code, "ABC");
		}
		v => panic!("unexpected result {v:?}"),
	}
	assert!(counters.snapshot().is_empty());
	Ok(())
}

#[test_log::test(tokio::test)]
async fn initializer_recovers_generated_counters() -> Result<(), Error> {
	let ds = new_ds().await?;
	let ctx = background();
	let tenant = TenantId::new();
	let generator = CodeGenerator::new(Arc::new(Counters::new()));
	let c = Customer {
		name: "Bestway".into(),
		city: "Dallas".into(),
	};
	for _ in 0..12 {
		repo::insert(&ctx, &ds, &generator, &CustomerCode(&c), tenant).await?;
	}
	// A restarted process starts with empty counters
	let counters = Arc::new(Counters::new());
	Initializer::new(counters.clone()).run(&ctx, &ds, &["customers"]).await?;
	assert_eq!(counters.get("customers", tenant, "BEST"), 12);
	Ok(())
}

#[test_log::test(tokio::test)]
async fn collisions_with_unseeded_rows_are_skipped() -> Result<(), Error> {
	let ds = new_ds().await?;
	let ctx = background();
	let tenant = TenantId::new();
	seed_codes(&ds, "customers", tenant, &["TARG0001  ", "TARG0002  ", "TARG0003  "]).await?;
	let counters = Arc::new(Counters::new());
	let generator = CodeGenerator::new(counters.clone());
	let c = Customer {
		name: "Target".into(),
		city: "Minneapolis".into(),
	};
	let record = repo::insert(&ctx, &ds, &generator, &CustomerCode(&c), tenant).await?;
	assert_eq!(record.code, "TARG0004  ");
	assert_eq!(counters.get("customers", tenant, "TARG"), 4);
	Ok(())
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn concurrent_inserts_receive_distinct_codes() -> Result<(), Error> {
	let ds = Arc::new(new_ds().await?);
	let ctx = background();
	let generator = Arc::new(CodeGenerator::new(Arc::new(Counters::new())));
	let tenant = TenantId::new();
	let count = 50;
	let tasks = (0..count).map(|_| {
		let ds = ds.clone();
		let ctx = ctx.clone();
		let generator = generator.clone();
		tokio::spawn(async move {
			let c = Customer {
				name: "Target".into(),
				city: "Minneapolis".into(),
			};
			repo::insert(&ctx, &ds, &generator, &CustomerCode(&c), tenant).await
		})
	});
	let mut codes = HashSet::new();
	for res in futures::future::join_all(tasks).await {
		let record = res.expect("Task failed")?;
		assert!(codes.insert(record.code));
	}
	assert_eq!(codes.len(), count);
	Ok(())
}

#[test_log::test(tokio::test)]
async fn cancelled_initialization_seeds_nothing() -> Result<(), Error> {
	let ds = new_ds().await?;
	let tenant = TenantId::new();
	seed_codes(&ds, "customers", tenant, &["TARG0005"]).await?;
	let mut ctx = MutableContext::background();
	ctx.add_cancel().cancel();
	let ctx = ctx.freeze();
	let counters = Arc::new(Counters::new());
	let res = Initializer::new(counters.clone()).run(&ctx, &ds, &["customers"]).await;
	assert!(matches!(res, Err(Error::QueryCancelled)));
	assert!(counters.snapshot().is_empty());
	Ok(())
}

#[test_log::test(tokio::test)]
async fn unavailable_stores_are_reported() {
	let res = tenantcode_core::store::Datastore::new("mysql://localhost/tms").await;
	assert!(matches!(res, Err(Error::StoreUnavailable { .. })));
}

#[test_log::test(tokio::test)]
async fn codes_committed_during_generation_are_skipped() -> Result<(), Error> {
	let ds = new_ds().await?;
	let ctx = background();
	let tenant = TenantId::new();
	let generator = CodeGenerator::new(Arc::new(Counters::new()));
	let c = Customer {
		name: "Target".into(),
		city: "Minneapolis".into(),
	};
	let tx = ds.transaction(TransactionType::Write, LockType::Pessimistic).await?;
	keygen::active_pattern(&tx, tenant, EntityKind::Customer).await?;
	// Another writer commits the first code after the transaction started
	seed_codes(&ds, "customers", tenant, &["TARG0001  "]).await?;
	let record = repo::insert_with_code(&ctx, &tx, &generator, &CustomerCode(&c), tenant).await?;
	tx.commit().await?;
	assert_eq!(record.code, "TARG0002  ");
	Ok(())
}
