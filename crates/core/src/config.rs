//! Tunables for the session, the in-memory scan, and the history list.
//!
//! Every section deserialises with `#[serde(default)]`, so a configuration
//! file only needs to mention the values it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Time after which staged results replace the visible ones.
pub const DEFAULT_FLICKER_WINDOW_MS: u64 = 200;

/// Shortest free-text query that starts a search without tokens.
pub const DEFAULT_MIN_QUERY_CHARS: usize = 2;

/// Number of matches delivered per batch by the in-memory scan.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Number of matches produced before a scan pauses and reports `has_more`.
pub const DEFAULT_PAGE_SIZE: usize = 200;

/// Maximum number of remembered searches.
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// Behaviour of a [`SearchSession`](crate::SearchSession).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
	/// Milliseconds staged results may lag behind before being flushed.
	pub flicker_window_ms: u64,
	/// Queries shorter than this, without tokens, clear the results instead of searching.
	pub min_query_chars: usize,
	/// Delay before a criteria edit is released. Zero emits synchronously.
	pub debounce_ms: u64,
}

impl SessionConfig {
	#[must_use]
	pub fn flicker_window(&self) -> Duration {
		Duration::from_millis(self.flicker_window_ms)
	}

	#[must_use]
	pub fn debounce(&self) -> Duration {
		Duration::from_millis(self.debounce_ms)
	}
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			flicker_window_ms: DEFAULT_FLICKER_WINDOW_MS,
			min_query_chars: DEFAULT_MIN_QUERY_CHARS,
			debounce_ms: 0,
		}
	}
}

/// Paging behaviour of the [`MemoryStore`](crate::MemoryStore) scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
	pub batch_size: usize,
	pub page_size: usize,
}

impl ScanConfig {
	/// Clamp values so that a scan always makes progress.
	#[must_use]
	pub fn sanitized(&self) -> Self {
		let batch_size = self.batch_size.max(1);
		Self {
			batch_size,
			page_size: self.page_size.max(batch_size),
		}
	}
}

impl Default for ScanConfig {
	fn default() -> Self {
		Self {
			batch_size: DEFAULT_BATCH_SIZE,
			page_size: DEFAULT_PAGE_SIZE,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
	pub capacity: usize,
}

impl Default for HistoryConfig {
	fn default() -> Self {
		Self {
			capacity: DEFAULT_HISTORY_CAPACITY,
		}
	}
}
