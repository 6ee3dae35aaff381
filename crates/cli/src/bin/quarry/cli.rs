use std::fmt::Write;
use std::path::PathBuf;

use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{ArgAction, ColorChoice, Parser, ValueEnum};
use quarry_core::AppDir;

/// Command-line arguments accepted by the `quarry` binary.
#[derive(Parser, Debug)]
#[command(
	name = "quarry",
	version,
	long_version = long_version(),
	about = "Search records as you type, one query per input line",
	color = ColorChoice::Auto,
	styles = cli_styles()
)]
pub(crate) struct CliArgs {
	#[arg(
		short,
		long,
		value_name = "FILE",
		help = "Records to search: JSON lines or plain text, one record per line"
	)]
	pub(crate) records: Option<PathBuf>,
	#[arg(
		short,
		long = "config",
		value_name = "FILE",
		env = "QUARRY_CONFIG",
		action = ArgAction::Append,
		help = "Additional configuration file to merge (default: none)"
	)]
	pub(crate) config: Vec<PathBuf>,
	#[arg(
		short = 'n',
		long = "no-config",
		help = "Skip loading default configuration files"
	)]
	pub(crate) no_config: bool,
	#[arg(
		long = "history-dir",
		value_name = "DIR",
		help = "Directory for the recent-search list (default: data directory)"
	)]
	pub(crate) history_dir: Option<PathBuf>,
	#[arg(long = "no-history", help = "Keep recent searches in memory only")]
	pub(crate) no_history: bool,
	#[arg(short = 'i', long = "case-sensitive", help = "Match letter case exactly")]
	pub(crate) case_sensitive: bool,
	#[arg(short = 'w', long = "word-prefix", help = "Only match at the start of words")]
	pub(crate) word_prefix: bool,
	#[arg(
		long = "page-size",
		value_name = "N",
		help = "Matches shown before asking for more (default: 200)"
	)]
	pub(crate) page_size: Option<usize>,
	#[arg(
		long = "suggest",
		value_name = "FIELD",
		action = ArgAction::Append,
		help = "Attribute whose values are offered as filters (default: every attribute)"
	)]
	pub(crate) suggest: Vec<String>,
	#[arg(
		short,
		long,
		value_enum,
		default_value_t = OutputFormat::Plain,
		help = "How results are printed"
	)]
	pub(crate) output: OutputFormat,
	#[arg(long = "print-config", help = "Print the effective configuration before starting")]
	pub(crate) print_config: bool,
	#[arg(short, long, help = "Log debug output to stderr")]
	pub(crate) verbose: bool,
}

/// Output formats supported by the CLI.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
	Plain,
	Json,
}

pub(crate) fn parse_cli() -> CliArgs {
	CliArgs::parse()
}

/// Version banner including the config and data directories.
fn long_version() -> &'static str {
	Box::leak(version_details().into_boxed_str())
}

fn version_details() -> String {
	let mut details = format!("quarry {}", env!("CARGO_PKG_VERSION"));
	let _ = writeln!(details);
	for dir in AppDir::ALL {
		let location = match dir.resolve() {
			Ok(path) => path.display().to_string(),
			Err(err) => format!("unavailable ({err})"),
		};
		let _ = writeln!(
			details,
			"{dir} directory: {location} (override with {})",
			dir.env_var()
		);
	}
	details
}

fn cli_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Green.on_default().effects(Effects::BOLD))
		.usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
		.literal(AnsiColor::Cyan.on_default())
		.placeholder(AnsiColor::Yellow.on_default())
}
