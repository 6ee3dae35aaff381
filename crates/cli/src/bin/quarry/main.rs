mod cli;
mod records;
mod repl;
mod settings;

use std::io;

use anyhow::Result;
use cli::{CliArgs, parse_cli};
use log::info;
use quarry_core::{
	BlobStore, FileBlobStore, HistoryStore, MemoryBlobStore, MemoryStore, SearchSession,
};
use records::{attribute_names, read_records};
use repl::Repl;
use settings::ResolvedConfig;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
	let cli = parse_cli();
	init_logging(&cli);

	let settings = settings::load(&cli)?;
	if cli.print_config {
		settings.print_summary();
	}

	match settings.history_dir.clone() {
		Some(dir) => {
			let history = HistoryStore::open(FileBlobStore::new(dir), &settings.history);
			run(&cli, settings, history)
		}
		None => {
			let history = HistoryStore::open(MemoryBlobStore::new(), &settings.history);
			run(&cli, settings, history)
		}
	}
}

/// Route `log` records from the libraries to stderr. `RUST_LOG` wins over
/// `--verbose`.
fn init_logging(cli: &CliArgs) {
	let default = if cli.verbose { "debug" } else { "warn" };
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(io::stderr)
		.init();
}

fn run<B: BlobStore>(
	cli: &CliArgs,
	settings: ResolvedConfig,
	history: HistoryStore<B>,
) -> Result<()> {
	let store = MemoryStore::new(settings.scan.clone());
	let records = match &settings.records {
		Some(path) => read_records(path)?,
		None => Vec::new(),
	};
	let names = attribute_names(&records);
	info!("loaded {} records", records.len());
	store.extend(records);

	let mut session =
		SearchSession::new(store.clone(), settings.session.clone()).with_options(settings.search);
	session.set_target_record_set(store.snapshot());

	let mut repl = Repl::new(
		store,
		session,
		history,
		settings.records,
		settings.suggest_fields,
		cli.output,
	);
	repl.set_attribute_names(&names);
	repl.run(io::stdin().lock(), io::stdout().lock())
}
