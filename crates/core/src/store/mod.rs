//! The durable store behind code generation.
//!
//! Everything related to a single transaction is defined in `tx.rs`. The
//! store enables the following operations:
//! - point lookups of codes within a tenant
//! - scans of every code in an entity table
//! - inserts and version-checked updates of entity records
//! - locked read-modify-write of per-tenant pro number counters
//! - idempotent creation of key generation records
//!
//! These operations can be processed by the following storage engines:
//! - `mem`: in-memory store, used by default and in tests
//! - `postgres`: [PostgreSQL](https://www.postgresql.org/) through `sqlx`

mod api;
mod clock;
mod ds;
mod mem;
mod postgres;
mod tr;
mod tx;

pub use api::Transactable;
pub use clock::{FakeClock, SizedClock, SystemClock};
pub use ds::Datastore;
pub use tr::{Check, LockType, TransactionType};
pub use tx::Transaction;
