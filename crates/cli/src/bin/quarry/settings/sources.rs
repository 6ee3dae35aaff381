use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use quarry_core::AppDir;

use crate::cli::CliArgs;

/// Prefix of `QUARRY__SECTION__KEY` variables.
const ENV_PREFIX: &str = "quarry";
/// Settings read from the config directory.
const USER_CONFIG_FILE: &str = "config.toml";
/// Settings read from the working directory, over the user file.
const LOCAL_CONFIG_FILE: &str = ".quarry.toml";
/// Keys whose environment values are comma-separated lists.
const LIST_KEYS: &[&str] = &["suggest.fields"];

/// Stack the default files, explicit `--config` files and the environment,
/// lowest precedence first.
pub(super) fn build_config(cli: &CliArgs) -> Result<Config> {
	let defaults = if cli.no_config {
		Vec::new()
	} else {
		default_config_files()
	};
	let optional = defaults
		.into_iter()
		.map(|path| File::from(path).format(FileFormat::Toml).required(false));
	let explicit = cli
		.config
		.iter()
		.map(|path| File::from(path.as_path()).required(true));

	let environment = LIST_KEYS.iter().fold(
		Environment::with_prefix(ENV_PREFIX)
			.separator("__")
			.try_parsing(true)
			.list_separator(","),
		|environment, key| environment.with_list_parse_key(key),
	);

	Config::builder()
		.add_source(optional.chain(explicit).collect::<Vec<_>>())
		.add_source(environment)
		.build()
		.context("failed to read configuration sources")
}

/// Default configuration files, lowest precedence first. A config directory
/// that cannot be resolved is skipped.
pub(super) fn default_config_files() -> Vec<PathBuf> {
	let user = AppDir::Config
		.resolve()
		.ok()
		.map(|dir| dir.join(USER_CONFIG_FILE));
	let local = env::current_dir()
		.ok()
		.map(|dir| dir.join(LOCAL_CONFIG_FILE));
	user.into_iter().chain(local).collect()
}
