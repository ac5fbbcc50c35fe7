//! Tenant-scoped business code generation.
//!
//! A code is a prefix derived from the fields of an entity through a named
//! [`Pattern`], followed by a zero-padded counter, and fixed to exactly ten
//! characters. The [`CodeGenerator`] draws counters from the in-memory
//! [`Counters`], and asks a [`UniquenessChecker`] whether each candidate is
//! already stored. The [`Initializer`] seeds the counters from the store
//! when the process starts.

mod checker;
mod counter;
pub mod entity;
mod generator;
mod initializer;
pub mod pattern;

pub use checker::UniquenessChecker;
pub use counter::Counters;
pub use entity::{CustomerCode, Entity, LocationCode, WorkerCode};
pub use generator::CodeGenerator;
pub use initializer::Initializer;
pub use pattern::{Pattern, fixed_length};
