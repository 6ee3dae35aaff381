//! Line-oriented front end: every input line is a new edit of the query.
//!
//! Plain words form the free text, `field=value` words become filters and
//! `@field` words become scopes. Lines starting with `:` are commands.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use log::warn;
use quarry_core::store::{BODY_FIELD, TITLE_FIELD};
use quarry_core::{
	AttributeClassifier, BlobStore, FilterSpec, HistoryStore, MemoryStore, OccurrenceKind,
	ScopeClassifier, ScopeSpec, SearchSession, SuggestionEngine, Token,
};
use serde_json::json;

use crate::cli::OutputFormat;
use crate::records::{attribute_names, read_records, replace_records};

/// Longest time to wait for a query before printing what has arrived.
const WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Occurrences listed per result in plain output.
const MAX_OCCURRENCES_SHOWN: usize = 3;

const HELP: &str = "\
words         free text
key=value     filter on an attribute
@field        search only in title, body or an attribute
:more         load the next page of results
:submit       remember the current search
:history      list recent searches
:recall N     run recent search N again
:forget       clear recent searches
:reload       re-read the records file
:quit         leave";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Input {
	Query { text: String, tokens: Vec<Token> },
	More,
	Submit,
	History,
	Recall(usize),
	Forget,
	Reload,
	Help,
	Quit,
	Unknown(String),
}

pub(crate) fn parse_input(line: &str) -> Input {
	let line = line.trim();
	if let Some(command) = line.strip_prefix(':') {
		let mut parts = command.split_whitespace();
		return match (parts.next().unwrap_or_default(), parts.next()) {
			("more", None) => Input::More,
			("submit", None) => Input::Submit,
			("history", None) => Input::History,
			("recall", Some(index)) => match index.parse() {
				Ok(index) if index > 0 => Input::Recall(index),
				_ => Input::Unknown(line.to_string()),
			},
			("forget", None) => Input::Forget,
			("reload", None) => Input::Reload,
			("help", None) => Input::Help,
			("quit" | "q", None) => Input::Quit,
			_ => Input::Unknown(line.to_string()),
		};
	}

	let mut words = Vec::new();
	let mut tokens = Vec::new();
	for word in line.split_whitespace() {
		if let Some(field) = word.strip_prefix('@').filter(|field| !field.is_empty()) {
			tokens.push(Token::Scope(ScopeSpec::new(field)));
			continue;
		}
		match word.split_once('=') {
			Some((field, value)) if !field.is_empty() && !value.is_empty() => {
				tokens.push(Token::Filter(FilterSpec::new(field, value)));
			}
			_ => words.push(word),
		}
	}
	Input::Query {
		text: words.join(" "),
		tokens,
	}
}

pub(crate) struct Repl<B> {
	store: MemoryStore,
	session: SearchSession<MemoryStore>,
	history: HistoryStore<B>,
	suggestions: SuggestionEngine,
	records_path: Option<PathBuf>,
	suggest_fields: Vec<String>,
	output: OutputFormat,
}

impl<B: BlobStore> Repl<B> {
	pub(crate) fn new(
		store: MemoryStore,
		session: SearchSession<MemoryStore>,
		history: HistoryStore<B>,
		records_path: Option<PathBuf>,
		suggest_fields: Vec<String>,
		output: OutputFormat,
	) -> Self {
		let mut repl = Self {
			store,
			session,
			history,
			suggestions: SuggestionEngine::new(),
			records_path,
			suggest_fields,
			output,
		};
		repl.rebuild_suggestions(&[]);
		repl
	}

	/// Build classifiers for the configured attributes, or for every attribute
	/// of `known` when none are configured.
	fn rebuild_suggestions(&mut self, known: &[String]) {
		let fields = if self.suggest_fields.is_empty() {
			known
		} else {
			self.suggest_fields.as_slice()
		};
		let mut engine = SuggestionEngine::new();
		for field in fields {
			engine.push(AttributeClassifier::new(
				field.clone(),
				self.store.attribute_values(field),
			));
		}
		engine.push(ScopeClassifier::new([TITLE_FIELD, BODY_FIELD]));
		self.suggestions = engine;
	}

	pub(crate) fn set_attribute_names(&mut self, names: &[String]) {
		self.rebuild_suggestions(names);
	}

	/// Process input until end of file or `:quit`.
	pub(crate) fn run(&mut self, input: impl BufRead, mut out: impl Write) -> Result<()> {
		for line in input.lines() {
			let line = line?;
			if !self.handle(parse_input(&line), &mut out)? {
				break;
			}
			out.flush()?;
		}
		Ok(())
	}

	/// Returns `false` when the loop should stop.
	fn handle(&mut self, input: Input, out: &mut impl Write) -> Result<bool> {
		match input {
			Input::Query { text, tokens } => {
				if self.session.edit(&text, tokens) {
					self.settle();
					self.print_results(out)?;
				}
			}
			Input::More => {
				if self.session.load_more() {
					self.settle();
					self.print_results(out)?;
				} else {
					writeln!(out, "nothing more to load")?;
				}
			}
			Input::Submit => match self.session.submit(&mut self.history) {
				Ok(true) => writeln!(out, "remembered")?,
				Ok(false) => writeln!(out, "nothing to remember")?,
				Err(err) => warn!("failed to save recent searches: {err:#}"),
			},
			Input::History => {
				for (index, entry) in self.history.list().enumerate() {
					let query = describe(&entry.search_term, &entry.tokens);
					writeln!(out, "{:>3}  {query}", index + 1)?;
				}
			}
			Input::Recall(index) => {
				let entry = self
					.history
					.list()
					.nth(index - 1)
					.and_then(|entry| self.history.select_entry(entry))
					.cloned();
				match entry {
					Some(entry) => {
						writeln!(out, "recalled {}", describe(&entry.search_term, &entry.tokens))?;
						if self.session.edit(&entry.search_term, entry.tokens) {
							self.settle();
						}
						self.print_results(out)?;
					}
					None => writeln!(out, "no recent search {index}")?,
				}
			}
			Input::Forget => {
				if let Err(err) = self.history.clear() {
					warn!("failed to save recent searches: {err:#}");
				}
			}
			Input::Reload => {
				if let Err(err) = self.reload(out) {
					writeln!(out, "reload failed: {err:#}")?;
				}
			}
			Input::Help => writeln!(out, "{HELP}")?,
			Input::Quit => return Ok(false),
			Input::Unknown(line) => writeln!(out, "unknown command {line:?}, try :help")?,
		}
		Ok(true)
	}

	fn settle(&mut self) {
		if !self.session.wait_idle(WAIT_TIMEOUT) {
			warn!("search still running after {WAIT_TIMEOUT:?}, showing partial results");
		}
	}

	fn reload(&mut self, out: &mut impl Write) -> Result<()> {
		let Some(path) = self.records_path.clone() else {
			writeln!(out, "no records file to reload")?;
			return Ok(());
		};
		let records = read_records(&path)?;
		let names = attribute_names(&records);
		let count = records.len();
		replace_records(&self.store, records);
		self.session.set_target_record_set(self.store.snapshot());
		self.rebuild_suggestions(&names);
		writeln!(out, "reloaded {count} records")?;
		Ok(())
	}

	fn print_results(&self, out: &mut impl Write) -> Result<()> {
		match self.output {
			OutputFormat::Plain => self.print_plain(out),
			OutputFormat::Json => self.print_json(out),
		}
	}

	fn print_plain(&self, out: &mut impl Write) -> Result<()> {
		let results = self.session.results();
		let query = describe(self.session.text(), self.session.tokens());
		writeln!(out, "{} results for {query}", results.len())?;

		for item in results {
			let title = self
				.store
				.get(&item.record)
				.map(|record| record.title)
				.unwrap_or_default();
			writeln!(out, "  {}  {title}", item.record)?;
			for occurrence in item.occurrences.iter().take(MAX_OCCURRENCES_SHOWN) {
				let field = match &occurrence.kind {
					OccurrenceKind::Title => TITLE_FIELD,
					OccurrenceKind::Body => BODY_FIELD,
					OccurrenceKind::Attribute(name) => name.as_str(),
				};
				writeln!(
					out,
					"      {field} {}:{}  {}",
					occurrence.line, occurrence.column, occurrence.snippet
				)?;
			}
		}

		if let Some(error) = self.session.last_error() {
			writeln!(out, "error: {error}")?;
		}
		if self.session.has_more() {
			writeln!(out, "more results available, type :more")?;
		}

		let suggestions = self.session.suggestions(&self.suggestions);
		if !suggestions.is_empty() {
			let offered: Vec<String> = suggestions
				.filters
				.into_iter()
				.map(Token::Filter)
				.chain(suggestions.scopes.into_iter().map(Token::Scope))
				.map(|token| token.to_string())
				.collect();
			writeln!(out, "try: {}", offered.join("  "))?;
		}
		Ok(())
	}

	fn print_json(&self, out: &mut impl Write) -> Result<()> {
		let payload = json!({
			"query": self.session.text(),
			"tokens": self.session.tokens(),
			"results": self.session.results(),
			"has_more": self.session.has_more(),
			"error": self.session.last_error().map(ToString::to_string),
		});
		writeln!(out, "{}", serde_json::to_string(&payload)?)?;
		Ok(())
	}
}

/// Render a query the way it would be typed.
fn describe(text: &str, tokens: &[Token]) -> String {
	let mut parts: Vec<String> = Vec::new();
	if !text.is_empty() {
		parts.push(format!("{text:?}"));
	}
	parts.extend(tokens.iter().map(ToString::to_string));
	if parts.is_empty() {
		"(empty query)".to_string()
	} else {
		parts.join(" ")
	}
}

#[cfg(test)]
mod tests {
	use quarry_core::{HistoryConfig, MemoryBlobStore, Record, ScanConfig, SessionConfig};

	use super::*;

	#[test]
	fn splits_words_filters_and_scopes() {
		assert_eq!(
			parse_input("  parser lang=rust @body fast "),
			Input::Query {
				text: "parser fast".to_string(),
				tokens: vec![
					Token::Filter(FilterSpec::new("lang", "rust")),
					Token::Scope(ScopeSpec::new("body")),
				],
			}
		);
	}

	#[test]
	fn incomplete_tokens_stay_in_the_text() {
		assert_eq!(
			parse_input("a= =b @"),
			Input::Query {
				text: "a= =b @".to_string(),
				tokens: Vec::new(),
			}
		);
	}

	#[test]
	fn parses_commands() {
		assert_eq!(parse_input(":more"), Input::More);
		assert_eq!(parse_input(":recall 2"), Input::Recall(2));
		assert_eq!(parse_input(":recall 0"), Input::Unknown(":recall 0".to_string()));
		assert_eq!(parse_input(":q"), Input::Quit);
		assert_eq!(parse_input(":nope"), Input::Unknown(":nope".to_string()));
	}

	fn repl(output: OutputFormat) -> Repl<MemoryBlobStore> {
		let store = MemoryStore::new(ScanConfig::default());
		let records = vec![
			Record::new("a", "Parser notes").with_attribute("lang", "rust"),
			Record::new("b", "Lexer notes").with_attribute("lang", "go"),
		];
		let names = attribute_names(&records);
		store.extend(records);

		let mut session = SearchSession::new(store.clone(), SessionConfig::default());
		session.set_target_record_set(store.snapshot());
		let history = HistoryStore::open(MemoryBlobStore::new(), &HistoryConfig::default());
		let mut repl = Repl::new(store, session, history, None, Vec::new(), output);
		repl.set_attribute_names(&names);
		repl
	}

	fn transcript(repl: &mut Repl<MemoryBlobStore>, input: &str) -> String {
		let mut out = Vec::new();
		repl.run(input.as_bytes(), &mut out).unwrap();
		String::from_utf8(out).unwrap()
	}

	#[test]
	fn prints_results_and_suggestions() {
		let mut repl = repl(OutputFormat::Plain);
		let text = transcript(&mut repl, "parser\n");

		assert!(text.starts_with("1 results for \"parser\"\n  a  Parser notes\n"));
		assert!(text.contains("      title 1:1  Parser notes\n"));
		assert!(text.contains("try: @title  @body\n"));
	}

	#[test]
	fn filters_narrow_and_history_recalls() {
		let mut repl = repl(OutputFormat::Plain);
		let text = transcript(
			&mut repl,
			"notes lang=go\n:submit\nx\n:history\n:recall 1\n:quit\nignored\n",
		);

		assert!(text.contains("1 results for \"notes\" lang=go\n  b  Lexer notes\n"));
		assert!(text.contains("remembered\n"));
		assert!(text.contains("0 results for \"x\"\n"));
		assert!(text.contains("  1  \"notes\" lang=go\n"));
		assert!(text.contains("recalled \"notes\" lang=go\n"));
		assert!(!text.contains("ignored"));
	}

	#[test]
	fn json_output_is_one_object_per_query() {
		let mut repl = repl(OutputFormat::Json);
		let text = transcript(&mut repl, "notes\n");
		let value: serde_json::Value = serde_json::from_str(text.trim()).unwrap();

		assert_eq!(value["query"], "notes");
		assert_eq!(value["results"].as_array().unwrap().len(), 2);
		assert_eq!(value["results"][0]["record"], "a");
		assert_eq!(value["has_more"], false);
	}
}
