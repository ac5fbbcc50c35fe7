use tokio_util::sync::CancellationToken;

/// A handle which cancels a context, and all of its children.
#[derive(Clone, Debug, Default)]
pub struct Canceller {
	/// A reference to the token of the context to be cancelled.
	token: CancellationToken,
}

impl Canceller {
	/// Create a new Canceller
	pub(crate) fn new(token: CancellationToken) -> Canceller {
		Canceller {
			token,
		}
	}

	/// Cancel the context.
	pub fn cancel(&self) {
		self.token.cancel();
	}
}
