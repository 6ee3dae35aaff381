use std::path::PathBuf;

use quarry_core::{HistoryConfig, MatchMode, ScanConfig, SearchOptions, SessionConfig};

/// Application-ready configuration.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedConfig {
	pub(crate) records: Option<PathBuf>,
	pub(crate) session: SessionConfig,
	pub(crate) scan: ScanConfig,
	pub(crate) search: SearchOptions,
	pub(crate) history: HistoryConfig,
	/// `None` keeps recent searches in memory only.
	pub(crate) history_dir: Option<PathBuf>,
	pub(crate) suggest_fields: Vec<String>,
}

impl ResolvedConfig {
	/// Print a human readable summary of the effective configuration.
	pub(crate) fn print_summary(&self) {
		println!("Effective configuration:");
		match &self.records {
			Some(path) => println!("  Records: {}", path.display()),
			None => println!("  Records: (none)"),
		}
		println!("  Flicker window: {} ms", self.session.flicker_window_ms);
		println!("  Minimum query length: {}", self.session.min_query_chars);
		println!("  Debounce: {} ms", self.session.debounce_ms);
		println!("  Batch size: {}", self.scan.batch_size);
		println!("  Page size: {}", self.scan.page_size);
		println!(
			"  Case sensitive: {}",
			bool_to_word(self.search.case_sensitive)
		);
		println!(
			"  Match mode: {}",
			match self.search.match_mode {
				MatchMode::Contains => "contains",
				MatchMode::WordPrefix => "word prefix",
			}
		);
		match &self.history_dir {
			Some(dir) => println!(
				"  History: {} ({} entries)",
				dir.display(),
				self.history.capacity
			),
			None => println!("  History: in memory ({} entries)", self.history.capacity),
		}
		if self.suggest_fields.is_empty() {
			println!("  Suggested filters: (all attributes)");
		} else {
			println!("  Suggested filters: {}", self.suggest_fields.join(", "));
		}
	}
}

fn bool_to_word(value: bool) -> &'static str {
	if value { "yes" } else { "no" }
}
