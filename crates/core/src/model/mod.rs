//! Plain data records for the entities which carry a generated code.
//!
//! These types know nothing about code generation. The adapters in
//! [`crate::code::entity`] derive prefixes and codes from their fields.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Whether a worker is employed directly or contracted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerType {
	#[default]
	Employee,
	Contractor,
}

impl WorkerType {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Employee => "Employee",
			Self::Contractor => "Contractor",
		}
	}
}

impl Display for WorkerType {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
	pub first_name: String,
	pub last_name: String,
	pub worker_type: WorkerType,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
	pub name: String,
	pub city: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
	pub name: String,
	pub city: String,
}
