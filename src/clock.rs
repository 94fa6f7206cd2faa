//! Time sources injected into the token manager and rate limiter.

// self
use crate::_prelude::*;

/// Supplies the current instant.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Returns the current instant.
	fn now(&self) -> OffsetDateTime;
}

/// Wall-clock time in UTC.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Manually driven clock for tests and replay tooling.
#[derive(Clone, Debug)]
pub struct ManualClock(Arc<Mutex<OffsetDateTime>>);
impl ManualClock {
	/// Creates a clock frozen at `instant`.
	pub fn new(instant: OffsetDateTime) -> Self {
		Self(Arc::new(Mutex::new(instant)))
	}

	/// Moves the clock to `instant`.
	pub fn set(&self, instant: OffsetDateTime) {
		*self.0.lock() = instant;
	}

	/// Moves the clock forward by `delta`.
	pub fn advance(&self, delta: Duration) {
		let mut guard = self.0.lock();

		*guard += delta;
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.0.lock()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn manual_clock_moves_only_when_told() {
		let clock = ManualClock::new(macros::datetime!(2025-05-01 23:59 UTC));
		let shared = clock.clone();

		assert_eq!(clock.now(), macros::datetime!(2025-05-01 23:59 UTC));

		shared.advance(Duration::minutes(2));

		assert_eq!(clock.now(), macros::datetime!(2025-05-02 00:01 UTC));

		clock.set(macros::datetime!(2025-01-01 00:00 UTC));

		assert_eq!(shared.now(), macros::datetime!(2025-01-01 00:00 UTC));
	}
}
