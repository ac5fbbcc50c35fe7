//! # Tenantcode Core
//!
//! Deterministic, tenant-scoped business code generation.
//!
//! The crate mints human readable identifiers (worker codes, customer codes,
//! location codes) that are unique within an organization, and year-prefixed
//! pro numbers that are strictly monotonic per organization. Both are backed
//! by a transactional [`store::Datastore`].
//!
//! The main entry points are:
//!
//! - [`code::CodeGenerator`], which combines the pattern resolver, the
//!   in-memory [`code::Counters`] and a [`code::UniquenessChecker`];
//! - [`code::Initializer`], which seeds the counters from existing rows at
//!   start-up;
//! - [`pronumber::ProNumberGenerator`], which allocates `S<YYYY>-<NNNNNN>`
//!   serials from a durable per-tenant counter row;
//! - [`repo::optimistic_update`], the version compare-and-swap used on every
//!   mutable record.

#[macro_use]
extern crate tracing;

#[macro_use]
mod mac;

pub mod catalog;
pub mod cnf;
pub mod code;
pub mod ctx;
pub mod err;
pub mod keygen;
pub mod model;
pub mod options;
pub mod pronumber;
pub mod repo;
pub mod store;
