use std::time::Duration;

use crate::cnf::{
	COLLISION_BUDGET, STORE_ACQUIRE_TIMEOUT_SECS, STORE_MAX_CONNECTIONS, TRANSACTION_MAX_RETRIES,
};

/// Configuration for the engine behaviour
///
/// The defaults are optimal so please only modify these if you know deliberately why you are modifying them.
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct EngineOptions {
	/// How many candidate codes a single generation may try
	pub collision_budget: u32,
	/// How many times a conflicting transaction is re-run
	pub transaction_max_retries: u32,
	/// The connection pool size for remote datastores
	pub max_connections: u32,
	/// How long to wait for a pooled connection
	pub acquire_timeout: Duration,
}

impl Default for EngineOptions {
	fn default() -> Self {
		Self {
			collision_budget: COLLISION_BUDGET,
			transaction_max_retries: *TRANSACTION_MAX_RETRIES,
			max_connections: *STORE_MAX_CONNECTIONS,
			acquire_timeout: Duration::from_secs(*STORE_ACQUIRE_TIMEOUT_SECS),
		}
	}
}

impl EngineOptions {
	pub fn with_collision_budget(mut self, budget: u32) -> Self {
		self.collision_budget = budget;
		self
	}
	pub fn with_transaction_max_retries(mut self, retries: u32) -> Self {
		self.transaction_max_retries = retries;
		self
	}
	pub fn with_max_connections(mut self, connections: u32) -> Self {
		self.max_connections = connections;
		self
	}
	pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
		self.acquire_timeout = timeout;
		self
	}
}
