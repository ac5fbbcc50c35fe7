//! Adapters which derive codes from the plain data records.

use serde::Serialize;

use super::pattern::{self, Pattern};
use crate::catalog::EntityKind;
use crate::model::{Customer, Location, Worker};

/// The capability an entity needs to take part in code generation.
pub trait Entity: Send + Sync {
	/// The kind of entity, which decides the supported patterns
	fn kind(&self) -> EntityKind;

	/// The durable table used for uniqueness checks
	fn table_identifier(&self) -> &str {
		self.kind().table()
	}

	/// The prefix derived from the fields of the entity. Unknown or
	/// unsupported pattern names use the default pattern of the kind.
	fn prefix_for(&self, pattern: &str) -> String;

	/// A candidate code combining the prefix with the counter
	fn format(&self, pattern: &str, counter: u64) -> String {
		pattern::join(&self.prefix_for(pattern), counter)
	}
}

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(transparent)]
pub struct WorkerCode<'a>(pub &'a Worker);

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(transparent)]
pub struct CustomerCode<'a>(pub &'a Customer);

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(transparent)]
pub struct LocationCode<'a>(pub &'a Location);

impl Entity for WorkerCode<'_> {
	fn kind(&self) -> EntityKind {
		EntityKind::Worker
	}

	fn prefix_for(&self, pattern: &str) -> String {
		let w = self.0;
		match self.kind().resolve(pattern) {
			Pattern::InitialLastName => pattern::initial_prefix(&w.first_name, &w.last_name),
			Pattern::TypeLastName => pattern::initial_prefix(w.worker_type.as_str(), &w.last_name),
			_ => pattern::prefix_of(&w.last_name),
		}
	}
}

impl Entity for CustomerCode<'_> {
	fn kind(&self) -> EntityKind {
		EntityKind::Customer
	}

	fn prefix_for(&self, pattern: &str) -> String {
		match self.kind().resolve(pattern) {
			Pattern::City => pattern::prefix_of(&self.0.city),
			_ => pattern::prefix_of(&self.0.name),
		}
	}
}

impl Entity for LocationCode<'_> {
	fn kind(&self) -> EntityKind {
		EntityKind::Location
	}

	fn prefix_for(&self, pattern: &str) -> String {
		match self.kind().resolve(pattern) {
			Pattern::City => pattern::prefix_of(&self.0.city),
			_ => pattern::prefix_of(&self.0.name),
		}
	}
}

impl<'a> From<&'a Worker> for WorkerCode<'a> {
	fn from(v: &'a Worker) -> Self {
		Self(v)
	}
}

impl<'a> From<&'a Customer> for CustomerCode<'a> {
	fn from(v: &'a Customer) -> Self {
		Self(v)
	}
}

impl<'a> From<&'a Location> for LocationCode<'a> {
	fn from(v: &'a Location) -> Self {
		Self(v)
	}
}
