mod raw;
mod resolved;
mod sources;

use anyhow::{Result, anyhow};

use crate::cli::CliArgs;
use raw::RawConfig;
pub(crate) use resolved::ResolvedConfig;

/// Load configuration by combining config files, environment variables and
/// CLI arguments, in increasing order of precedence.
pub(crate) fn load(cli: &CliArgs) -> Result<ResolvedConfig> {
	let builder = sources::build_config(cli)?;
	let mut raw: RawConfig = builder
		.try_deserialize()
		.map_err(|err| anyhow!("failed to deserialize configuration: {err}"))?;
	raw.apply_cli_overrides(cli);
	raw.resolve(cli)
}
