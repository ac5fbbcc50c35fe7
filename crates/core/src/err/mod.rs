use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::catalog::{EntityKind, TenantId};

/// A specialized `Result` type for code generation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error originating from the code generation subsystem.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
	/// The engine encountered unreachable logic
	#[error("The engine encountered unreachable logic: {0}")]
	Unreachable(String),

	/// The durable store could not be reached, or failed at the transport level
	#[error("The durable store is unavailable{}: {message}", table_suffix(.table))]
	StoreUnavailable {
		table: Option<String>,
		message: String,
	},

	/// Every candidate code tried was already present in the store
	#[error(
		"Unable to generate a unique code for table '{table}' and tenant '{tenant}' with prefix '{prefix}' after {attempts} attempts (last counter {counter})"
	)]
	CollisionBudgetExceeded {
		table: String,
		tenant: TenantId,
		prefix: String,
		attempts: u32,
		counter: u64,
	},

	/// A stored code is too short to carry a prefix
	#[error("Found malformed code '{code}' in table '{table}'")]
	MalformedCode {
		table: String,
		code: String,
	},

	/// The record was modified by another writer since it was read
	#[error("Version mismatch: record '{id}' is no longer at version {version}")]
	VersionConflict {
		id: Uuid,
		version: i64,
	},

	/// The pattern can not be used for this kind of entity
	#[error("The pattern '{pattern}' is not supported for {kind}")]
	InvalidPattern {
		kind: EntityKind,
		pattern: String,
	},

	/// The table name is not a plain identifier
	#[error("Invalid table identifier '{0}'")]
	InvalidTable(String),

	/// The transaction was already cancelled or committed
	#[error("Couldn't update a finished transaction")]
	TxFinished,

	/// The current transaction was created as read-only
	#[error("Couldn't write to a read only transaction")]
	TxReadonly,

	/// The key being inserted in the transaction already exists
	#[error("The key being inserted already exists")]
	TxKeyAlreadyExists,

	/// The transaction conflicted with a concurrent transaction and can be retried
	#[error("The transaction conflicted with a concurrent transaction: {0}")]
	TxRetryable(String),

	/// Invalid timeout
	#[error("Invalid timeout: {0:?} seconds")]
	InvalidTimeout(u64),

	/// The operation timedout
	#[error("The operation was not executed because it exceeded the timeout")]
	QueryTimedout,

	/// The operation did not execute, because the context was cancelled
	#[error("The operation was not executed due to a cancelled context")]
	QueryCancelled,

	/// A stored value could not be serialized or deserialized
	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

fn table_suffix(table: &Option<String>) -> String {
	match table {
		Some(table) => format!(" for table '{table}'"),
		None => String::new(),
	}
}

impl Error {
	#[track_caller]
	pub fn unreachable<T: fmt::Display>(message: T) -> Error {
		let location = std::panic::Location::caller();
		let message = format!("{}:{}: {}", location.file(), location.line(), message);
		Error::Unreachable(message)
	}

	/// Creates a store error which is not tied to a specific table
	pub fn store<T: fmt::Display>(message: T) -> Error {
		Error::StoreUnavailable {
			table: None,
			message: message.to_string(),
		}
	}

	/// Attaches a table name to a store error, if it does not have one yet
	pub fn on_table(self, name: &str) -> Error {
		match self {
			Error::StoreUnavailable {
				table: None,
				message,
			} => Error::StoreUnavailable {
				table: Some(name.to_owned()),
				message,
			},
			e => e,
		}
	}

	/// Check if this error can be resolved by re-running the transaction
	pub fn is_retryable(&self) -> bool {
		matches!(self, Error::TxRetryable(_))
	}
}

#[cfg(feature = "store-postgres")]
impl From<sqlx::Error> for Error {
	fn from(e: sqlx::Error) -> Self {
		if let Some(db) = e.as_database_error() {
			if db.is_unique_violation() {
				return Error::TxKeyAlreadyExists;
			}
			// serialization_failure and deadlock_detected
			if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) {
				return Error::TxRetryable(db.message().to_owned());
			}
		}
		Error::store(e)
	}
}
