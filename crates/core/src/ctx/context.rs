use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::ctx::canceller::Canceller;
use crate::ctx::reason::Reason;
use crate::err::{Error, Result};

pub type Context = Arc<MutableContext>;

/// Carries cancellation and an optional deadline through every blocking
/// operation of the engine.
#[non_exhaustive]
pub struct MutableContext {
	// An optional deadline.
	deadline: Option<Instant>,
	// Cancelled when this context, or any parent context, is cancelled.
	cancelled: CancellationToken,
}

impl Default for MutableContext {
	fn default() -> Self {
		MutableContext::background()
	}
}

impl Debug for MutableContext {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Context")
			.field("deadline", &self.deadline)
			.field("cancelled", &self.cancelled.is_cancelled())
			.finish()
	}
}

impl MutableContext {
	/// Creates a new empty background context.
	pub fn background() -> Self {
		Self {
			deadline: None,
			cancelled: CancellationToken::new(),
		}
	}

	/// Creates a new context from a frozen parent context.
	/// The new context is cancelled whenever the parent is,
	/// and never outlives the deadline of the parent.
	pub fn new(parent: &Context) -> Self {
		Self {
			deadline: parent.deadline,
			cancelled: parent.cancelled.child_token(),
		}
	}

	/// Freezes this context, allowing it to be shared between tasks.
	pub fn freeze(self) -> Context {
		Arc::new(self)
	}

	/// Add cancellation to the context. The value that is returned will cancel
	/// the context and it's children once called.
	pub fn add_cancel(&mut self) -> Canceller {
		Canceller::new(self.cancelled.clone())
	}

	/// Add a deadline to the context. If the current deadline is sooner than
	/// the provided deadline, this method does nothing.
	pub fn add_deadline(&mut self, deadline: Instant) {
		match self.deadline {
			Some(current) if current < deadline => (),
			_ => self.deadline = Some(deadline),
		}
	}

	/// Add a timeout to the context. If the current timeout is sooner than
	/// the provided timeout, this method does nothing. If the result of the
	/// addition causes an overflow, this method returns an error.
	pub fn add_timeout(&mut self, timeout: Duration) -> Result<()> {
		match Instant::now().checked_add(timeout) {
			Some(deadline) => {
				self.add_deadline(deadline);
				Ok(())
			}
			None => Err(Error::InvalidTimeout(timeout.as_secs())),
		}
	}

	/// Check if the context is done. If it returns `None` the operation may
	/// proceed, otherwise the operation should be stopped.
	pub fn done(&self) -> Option<Reason> {
		match self.deadline {
			Some(deadline) if deadline <= Instant::now() => Some(Reason::Timedout),
			_ if self.cancelled.is_cancelled() => Some(Reason::Canceled),
			_ => None,
		}
	}

	/// Returns an error if the context is not ok to continue.
	pub fn expect_not_done(&self) -> Result<()> {
		match self.done() {
			Some(reason) => Err(reason.into()),
			None => Ok(()),
		}
	}

	/// Drives a blocking operation to completion, unless the context is
	/// cancelled or its deadline passes first. In that case the operation
	/// is dropped, which rolls back any transaction it owns.
	pub async fn run<T, F>(&self, fut: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		self.expect_not_done()?;
		tokio::select! {
			biased;
			_ = self.cancelled.cancelled() => Err(Reason::Canceled.into()),
			_ = expiry(self.deadline) => Err(Reason::Timedout.into()),
			res = fut => res,
		}
	}
}

async fn expiry(deadline: Option<Instant>) {
	match deadline {
		Some(deadline) => tokio::time::sleep_until(deadline).await,
		None => std::future::pending().await,
	}
}
