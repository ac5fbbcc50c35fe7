use std::fmt;

/// Specifies whether the transaction is read-only or writeable.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TransactionType {
	Read,
	Write,
}

impl From<bool> for TransactionType {
	fn from(value: bool) -> Self {
		match value {
			true => TransactionType::Write,
			false => TransactionType::Read,
		}
	}
}

/// Specifies how a transaction isolates itself from concurrent writers.
///
/// Pessimistic transactions run at read committed isolation and rely on
/// explicit row locks. Optimistic transactions run at snapshot isolation
/// and fail with [`crate::err::Error::TxRetryable`] on conflict.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LockType {
	Pessimistic,
	Optimistic,
}

impl From<bool> for LockType {
	fn from(value: bool) -> Self {
		match value {
			true => LockType::Pessimistic,
			false => LockType::Optimistic,
		}
	}
}

/// What to do when a writeable transaction is dropped while still open.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Check {
	None,
	#[default]
	Warn,
	Error,
}

impl Check {
	/// The level used for new transactions
	pub(crate) fn current() -> Self {
		#[cfg(not(debug_assertions))]
		let check = Check::Warn;
		#[cfg(debug_assertions)]
		let check = Check::Error;
		check
	}

	/// Reports a transaction which was dropped without being finished
	pub(crate) fn report(&self, kind: &str) {
		match self {
			Check::None => {
				trace!(target: "tenantcode::core::store::tr", kind, "A transaction was dropped without being committed or cancelled");
			}
			Check::Warn => {
				warn!(target: "tenantcode::core::store::tr", kind, "A transaction was dropped without being committed or cancelled");
			}
			Check::Error => {
				error!(target: "tenantcode::core::store::tr", kind, "A transaction was dropped without being committed or cancelled");
			}
		}
	}
}

impl fmt::Display for TransactionType {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			TransactionType::Read => f.write_str("read"),
			TransactionType::Write => f.write_str("write"),
		}
	}
}
