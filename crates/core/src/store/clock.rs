use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;

/// The source of "now" for everything which stamps or formats a time.
///
/// The system clock is used in production. Tests swap in a [`FakeClock`]
/// which only moves when told to.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum SizedClock {
	System(SystemClock),
	Fake(FakeClock),
}

impl Default for SizedClock {
	fn default() -> Self {
		SizedClock::System(SystemClock)
	}
}

impl From<FakeClock> for SizedClock {
	fn from(v: FakeClock) -> Self {
		SizedClock::Fake(v)
	}
}

impl SizedClock {
	pub fn now(&self) -> DateTime<Utc> {
		match self {
			SizedClock::System(c) => c.now(),
			SizedClock::Fake(c) => c.now(),
		}
	}
}

/// Reads the wall clock of the host.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl SystemClock {
	pub fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// A manually driven clock. Clones share the same time.
#[derive(Clone, Debug)]
pub struct FakeClock {
	now: Arc<RwLock<DateTime<Utc>>>,
}

impl FakeClock {
	pub fn new(now: DateTime<Utc>) -> Self {
		Self {
			now: Arc::new(RwLock::new(now)),
		}
	}

	pub fn now(&self) -> DateTime<Utc> {
		*self.now.read()
	}

	pub fn set(&self, now: DateTime<Utc>) {
		*self.now.write() = now;
	}

	pub fn advance(&self, by: TimeDelta) {
		let mut now = self.now.write();
		*now += by;
	}
}

#[cfg(test)]
mod tests {
	use chrono::{Datelike, TimeZone};

	use super::*;

	#[test]
	fn fake_clocks_share_their_time() {
		let start = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
		let clock = FakeClock::new(start);
		let sized = SizedClock::from(clock.clone());
		assert_eq!(sized.now(), start);
		clock.advance(TimeDelta::seconds(1));
		assert_eq!(sized.now().year(), 2024);
		clock.set(start);
		assert_eq!(sized.now(), start);
	}
}
