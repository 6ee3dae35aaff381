use std::path::PathBuf;

use anyhow::{Context, Result, ensure};
use quarry_core::config::DEFAULT_HISTORY_CAPACITY;
use quarry_core::{AppDir, HistoryConfig, MatchMode, ScanConfig, SearchOptions, SessionConfig};
use serde::Deserialize;

use super::resolved::ResolvedConfig;
use crate::cli::CliArgs;

/// Configuration as read from files and the environment, before CLI
/// overrides and validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(super) struct RawConfig {
	pub(super) session: SessionConfig,
	pub(super) scan: ScanConfig,
	pub(super) search: SearchOptions,
	pub(super) history: HistorySection,
	pub(super) suggest: SuggestSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(super) struct HistorySection {
	pub(super) enabled: bool,
	pub(super) capacity: usize,
	pub(super) dir: Option<PathBuf>,
}

impl Default for HistorySection {
	fn default() -> Self {
		Self {
			enabled: true,
			capacity: DEFAULT_HISTORY_CAPACITY,
			dir: None,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(super) struct SuggestSection {
	/// Attributes offered as filters. Empty means every attribute.
	pub(super) fields: Vec<String>,
}

impl RawConfig {
	pub(super) fn apply_cli_overrides(&mut self, cli: &CliArgs) {
		if cli.case_sensitive {
			self.search.case_sensitive = true;
		}
		if cli.word_prefix {
			self.search.match_mode = MatchMode::WordPrefix;
		}
		if let Some(page_size) = cli.page_size {
			self.scan.page_size = page_size;
		}
		if cli.no_history {
			self.history.enabled = false;
		}
		if let Some(dir) = cli.history_dir.clone() {
			self.history.dir = Some(dir);
		}
		if !cli.suggest.is_empty() {
			self.suggest.fields = cli.suggest.clone();
		}
	}

	/// Validate the values and fill in derived defaults.
	pub(super) fn resolve(self, cli: &CliArgs) -> Result<ResolvedConfig> {
		ensure!(self.scan.batch_size > 0, "scan.batch_size must be at least 1");
		ensure!(self.scan.page_size > 0, "scan.page_size must be at least 1");

		let history_dir = if self.history.enabled {
			match self.history.dir {
				Some(dir) => Some(dir),
				None => Some(
					AppDir::Data.resolve().context("failed to resolve the history directory")?,
				),
			}
		} else {
			None
		};

		let suggest_fields = self
			.suggest
			.fields
			.into_iter()
			.map(|field| field.trim().to_string())
			.filter(|field| !field.is_empty())
			.collect();

		Ok(ResolvedConfig {
			records: cli.records.clone(),
			session: self.session,
			scan: self.scan.sanitized(),
			search: self.search,
			history: HistoryConfig {
				capacity: self.history.capacity,
			},
			history_dir,
			suggest_fields,
		})
	}
}
