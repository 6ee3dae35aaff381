//! Anti-flicker reconciliation of incoming batches with the visible results.
//!
//! When a new query starts while results are on screen, incoming batches are
//! staged instead of replacing the visible list right away. The staged list
//! becomes visible in one step once the flicker window has elapsed or the
//! operation finishes, whichever comes first.

use std::mem;
use std::time::{Duration, Instant};

use crate::operation::ResultItem;

#[derive(Debug, Default)]
pub(crate) struct ResultReconciler {
	results: Vec<ResultItem>,
	staging: Vec<ResultItem>,
	/// Set while staging; cleared together with `staging`.
	dirty_since: Option<Instant>,
}

impl ResultReconciler {
	pub(crate) fn results(&self) -> &[ResultItem] {
		&self.results
	}

	pub(crate) fn staged(&self) -> &[ResultItem] {
		&self.staging
	}

	pub(crate) fn is_staging(&self) -> bool {
		self.dirty_since.is_some()
	}

	/// Prepare for a new query. Staging starts only when there is something on
	/// screen worth keeping.
	pub(crate) fn restart(&mut self, now: Instant) {
		self.staging.clear();
		self.dirty_since = if self.results.is_empty() {
			None
		} else {
			Some(now)
		};
	}

	pub(crate) fn clear(&mut self) {
		self.results.clear();
		self.staging.clear();
		self.dirty_since = None;
	}

	/// Absorb a batch. Returns whether the visible results changed.
	pub(crate) fn absorb(
		&mut self,
		batch: Vec<ResultItem>,
		now: Instant,
		window: Duration,
	) -> bool {
		match self.dirty_since {
			Some(since) => {
				self.staging.extend(batch);
				if now.saturating_duration_since(since) > window {
					self.flush();
					true
				} else {
					false
				}
			}
			None => {
				self.results.extend(batch);
				true
			}
		}
	}

	/// Flush staged results whose window has run out. An empty staging buffer
	/// is left alone so the old results stay until something replaces them.
	pub(crate) fn flush_if_elapsed(&mut self, now: Instant, window: Duration) -> bool {
		match self.dirty_since {
			Some(since)
				if !self.staging.is_empty() && now.saturating_duration_since(since) > window =>
			{
				self.flush();
				true
			}
			_ => false,
		}
	}

	/// Force the staged results into view at the end of an operation.
	pub(crate) fn finish(&mut self) -> bool {
		if self.dirty_since.is_none() {
			return false;
		}
		self.flush();
		true
	}

	fn flush(&mut self) {
		self.results = mem::take(&mut self.staging);
		self.dirty_since = None;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const WINDOW: Duration = Duration::from_millis(200);

	fn items(ids: &[&str]) -> Vec<ResultItem> {
		ids.iter().map(|id| ResultItem::new(*id, Vec::new())).collect()
	}

	fn visible(reconciler: &ResultReconciler) -> Vec<String> {
		reconciler
			.results()
			.iter()
			.map(|item| item.record.to_string())
			.collect()
	}

	#[test]
	fn appends_directly_without_prior_results() {
		let start = Instant::now();
		let mut reconciler = ResultReconciler::default();
		reconciler.restart(start);
		assert!(!reconciler.is_staging());

		assert!(reconciler.absorb(items(&["a"]), start, WINDOW));
		assert!(reconciler.absorb(items(&["b"]), start, WINDOW));
		assert_eq!(visible(&reconciler), vec!["a", "b"]);
	}

	#[test]
	fn stages_until_window_elapses() {
		let start = Instant::now();
		let mut reconciler = ResultReconciler::default();
		reconciler.absorb(items(&["old"]), start, WINDOW);
		reconciler.restart(start);

		assert!(!reconciler.absorb(items(&["c"]), start + Duration::from_millis(50), WINDOW));
		assert!(!reconciler.absorb(items(&["d"]), start + Duration::from_millis(200), WINDOW));
		assert_eq!(visible(&reconciler), vec!["old"]);

		assert!(reconciler.absorb(items(&["e"]), start + Duration::from_millis(201), WINDOW));
		assert_eq!(visible(&reconciler), vec!["c", "d", "e"]);
		assert!(!reconciler.is_staging());
		assert!(reconciler.staged().is_empty());
	}

	#[test]
	fn finish_forces_flush_even_when_empty() {
		let start = Instant::now();
		let mut reconciler = ResultReconciler::default();
		reconciler.absorb(items(&["old"]), start, WINDOW);
		reconciler.restart(start);

		assert!(reconciler.finish());
		assert!(reconciler.results().is_empty());
		assert!(!reconciler.finish());
	}

	#[test]
	fn timer_flush_skips_empty_staging() {
		let start = Instant::now();
		let mut reconciler = ResultReconciler::default();
		reconciler.absorb(items(&["old"]), start, WINDOW);
		reconciler.restart(start);

		let late = start + Duration::from_millis(500);
		assert!(!reconciler.flush_if_elapsed(late, WINDOW));
		assert_eq!(visible(&reconciler), vec!["old"]);

		reconciler.staging.extend(items(&["new"]));
		assert!(reconciler.flush_if_elapsed(late, WINDOW));
		assert_eq!(visible(&reconciler), vec!["new"]);
	}

	#[test]
	fn restart_discards_previous_staging() {
		let start = Instant::now();
		let mut reconciler = ResultReconciler::default();
		reconciler.absorb(items(&["old"]), start, WINDOW);
		reconciler.restart(start);
		reconciler.absorb(items(&["stale"]), start, WINDOW);

		reconciler.restart(start + Duration::from_millis(10));
		assert!(reconciler.staged().is_empty());
		assert!(reconciler.is_staging());
	}
}
