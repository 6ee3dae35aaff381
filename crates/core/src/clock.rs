//! Monotonic time source injected into the session.
//!
//! The anti-flicker window and the criteria debounce both compare instants.
//! Production code reads [`SystemClock`]; tests drive [`ManualClock`] so that
//! timing scenarios are reproducible.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Source of monotonic instants.
pub trait Clock: Send + Sync {
	/// Current instant.
	fn now(&self) -> Instant;
}

/// Clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> Instant {
		Instant::now()
	}
}

/// Clock that only moves when told to.
///
/// Clones share the same underlying instant, so a test can keep one handle and
/// give another to the session.
#[derive(Clone)]
pub struct ManualClock {
	now: Arc<Mutex<Instant>>,
}

impl ManualClock {
	/// Create a clock frozen at the current instant.
	#[must_use]
	pub fn new() -> Self {
		Self {
			now: Arc::new(Mutex::new(Instant::now())),
		}
	}

	/// Move the clock forward.
	pub fn advance(&self, by: Duration) {
		let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
		*now += by;
	}
}

impl Default for ManualClock {
	fn default() -> Self {
		Self::new()
	}
}

impl Clock for ManualClock {
	fn now(&self) -> Instant {
		*self.now.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

impl fmt::Debug for ManualClock {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ManualClock").finish_non_exhaustive()
	}
}
