//! Time source for lifecycle decisions.
//!
//! Expiry timestamps and expiration checks read the time through [`Clock`]
//! so tests can move time explicitly.

use chrono::{DateTime, Duration, Utc};
use std::sync::RwLock;

/// Source of the current time.
pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
	now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
	pub fn new(start: DateTime<Utc>) -> Self {
		Self {
			now: RwLock::new(start),
		}
	}

	pub fn set(&self, now: DateTime<Utc>) {
		let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
		*guard = now;
	}

	pub fn advance(&self, by: Duration) {
		let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
		*guard += by;
	}
}

impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		*self.now.read().unwrap_or_else(|e| e.into_inner())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_manual_clock_moves_only_when_told() {
		let start = Utc::now();
		let clock = ManualClock::new(start);
		assert_eq!(clock.now(), start);

		clock.advance(Duration::hours(2));
		assert_eq!(clock.now(), start + Duration::hours(2));

		clock.set(start);
		assert_eq!(clock.now(), start);
	}
}
