pub(crate) mod canceller;
mod context;
pub(crate) mod reason;

pub use canceller::Canceller;
pub use context::{Context, MutableContext};
pub use reason::Reason;
