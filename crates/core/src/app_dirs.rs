//! Where `quarry` keeps its configuration and persisted state.
//!
//! Each [`AppDir`] can be pointed elsewhere with its own environment variable;
//! otherwise the platform location from the `directories` crate is used.

use std::env;
use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;

/// A directory the application reads from or writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppDir {
	/// Holds `config.toml`.
	Config,
	/// Holds persisted state such as recent searches.
	Data,
}

impl AppDir {
	pub const ALL: [Self; 2] = [Self::Config, Self::Data];

	/// Environment variable overriding this directory. An empty value counts
	/// as unset.
	#[must_use]
	pub const fn env_var(self) -> &'static str {
		match self {
			Self::Config => "QUARRY_CONFIG_DIR",
			Self::Data => "QUARRY_DATA_DIR",
		}
	}

	pub fn resolve(self) -> Result<PathBuf> {
		if let Some(dir) = env::var_os(self.env_var()).filter(|value| !value.is_empty()) {
			return Ok(PathBuf::from(dir));
		}

		let dirs = ProjectDirs::from("rs", "quarry", "quarry")
			.with_context(|| format!("no home directory to place the {self} directory in"))?;
		Ok(match self {
			Self::Config => dirs.config_local_dir(),
			Self::Data => dirs.data_local_dir(),
		}
		.to_path_buf())
	}
}

impl fmt::Display for AppDir {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Config => "config",
			Self::Data => "data",
		})
	}
}
