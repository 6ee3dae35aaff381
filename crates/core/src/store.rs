//! In-memory record store backing the [`OperationSource`] contract.
//!
//! Records live in insertion order behind a shared lock so the collection can
//! keep growing while searches run. Each operation scans a snapshot of
//! identifiers on its own worker thread, emitting batches of
//! [`ScanConfig::batch_size`] matches and pausing after
//! [`ScanConfig::page_size`] matches with `has_more` set when another match
//! follows. Resuming continues from the recorded position on a fresh worker.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;

use indexmap::{IndexMap, IndexSet};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::ScanConfig;
use crate::criteria::{MatchMode, SearchCriteria};
use crate::error::OperationError;
use crate::operation::{
	Completion, Occurrence, OccurrenceKind, OperationId, OperationRequest, OperationSink,
	OperationSource, RecordRef, RecordSnapshot, ResultItem, SearchOperation,
};

/// Characters kept on each side of a match when clipping a snippet.
const SNIPPET_CONTEXT: usize = 40;

/// Scope name selecting the record title.
pub const TITLE_FIELD: &str = "title";

/// Scope name selecting the record body.
pub const BODY_FIELD: &str = "body";

/// Structured record held by the [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
	pub id: RecordRef,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub body: String,
	#[serde(default)]
	pub attributes: BTreeMap<String, String>,
}

impl Record {
	pub fn new(id: impl Into<RecordRef>, title: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			title: title.into(),
			body: String::new(),
			attributes: BTreeMap::new(),
		}
	}

	#[must_use]
	pub fn with_body(mut self, body: impl Into<String>) -> Self {
		self.body = body.into();
		self
	}

	#[must_use]
	pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.attributes.insert(name.into(), value.into());
		self
	}
}

type RecordMap = IndexMap<RecordRef, Record>;

/// Growable collection of records that can be searched incrementally.
///
/// Clones share the same records.
#[derive(Clone, Default)]
pub struct MemoryStore {
	records: Arc<RwLock<RecordMap>>,
	scan: ScanConfig,
}

impl MemoryStore {
	#[must_use]
	pub fn new(scan: ScanConfig) -> Self {
		Self {
			records: Arc::default(),
			scan: scan.sanitized(),
		}
	}

	/// Insert or replace a record. Replacing keeps the original position.
	pub fn insert(&self, record: Record) {
		let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
		records.insert(record.id.clone(), record);
	}

	pub fn extend(&self, incoming: impl IntoIterator<Item = Record>) {
		let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
		for record in incoming {
			records.insert(record.id.clone(), record);
		}
	}

	pub fn remove(&self, id: &RecordRef) -> Option<Record> {
		let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
		records.shift_remove(id)
	}

	#[must_use]
	pub fn get(&self, id: &RecordRef) -> Option<Record> {
		let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
		records.get(id).cloned()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.records.read().unwrap_or_else(PoisonError::into_inner).len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Identifiers of every record, in insertion order.
	#[must_use]
	pub fn snapshot(&self) -> RecordSnapshot {
		let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
		records.keys().cloned().collect()
	}

	/// Distinct values of an attribute, sorted.
	#[must_use]
	pub fn attribute_values(&self, field: &str) -> Vec<String> {
		let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
		records
			.values()
			.filter_map(|record| record.attributes.get(field).cloned())
			.collect::<BTreeSet<_>>()
			.into_iter()
			.collect()
	}

	fn match_reference(
		&self,
		reference: &RecordRef,
		criteria: &SearchCriteria,
		matcher: &TermMatcher,
	) -> Result<Option<ResultItem>, OperationError> {
		let records = self.records.read().map_err(|_| OperationError::Scan {
			reason: "record store lock poisoned".to_string(),
		})?;
		Ok(records
			.get(reference)
			.and_then(|record| match_record(record, criteria, matcher)))
	}
}

impl OperationSource for MemoryStore {
	fn create(&self, request: OperationRequest, sink: OperationSink) -> Box<dyn SearchOperation> {
		Box::new(ScanOperation::new(self.clone(), request, sink))
	}
}

/// Position of a scan within its snapshot.
#[derive(Debug, Clone, Copy, Default)]
struct ScanCursor {
	position: usize,
	skip: usize,
}

/// Threaded scan over a [`RecordSnapshot`].
struct ScanOperation {
	id: OperationId,
	store: MemoryStore,
	criteria: Arc<SearchCriteria>,
	records: RecordSnapshot,
	sink: OperationSink,
	cursor: Arc<Mutex<ScanCursor>>,
}

impl ScanOperation {
	fn new(store: MemoryStore, request: OperationRequest, sink: OperationSink) -> Self {
		Self {
			id: request.id,
			store,
			criteria: Arc::new(request.criteria),
			records: request.records,
			sink,
			cursor: Arc::new(Mutex::new(ScanCursor {
				position: 0,
				skip: request.skip,
			})),
		}
	}

	fn spawn_page(&self) {
		let store = self.store.clone();
		let criteria = Arc::clone(&self.criteria);
		let records = Arc::clone(&self.records);
		let sink = self.sink.clone();
		let cursor = Arc::clone(&self.cursor);
		thread::spawn(move || {
			let completion = run_page(|| scan_page(&store, &criteria, &records, &cursor, &sink));
			if let Some(completion) = completion {
				sink.finish(completion);
			}
		});
	}

	fn remaining(&self) -> bool {
		let cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
		cursor.position < self.records.len()
	}
}

impl SearchOperation for ScanOperation {
	fn id(&self) -> OperationId {
		self.id
	}

	fn start(&mut self) {
		debug!("scan {} started over {} records", self.id, self.records.len());
		self.spawn_page();
	}

	fn cancel(&mut self) {
		self.sink.cancel_token().cancel();
	}

	fn resume(&mut self) -> bool {
		if self.sink.is_cancelled() || !self.remaining() {
			return false;
		}
		debug!("scan {} resumed", self.id);
		self.spawn_page();
		true
	}
}

impl Drop for ScanOperation {
	fn drop(&mut self) {
		self.sink.cancel_token().cancel();
	}
}

/// Scan one page. Returns `Ok(None)` when the run stopped without completing
/// because it was cancelled or the session hung up.
fn scan_page(
	store: &MemoryStore,
	criteria: &SearchCriteria,
	records: &[RecordRef],
	cursor: &Mutex<ScanCursor>,
	sink: &OperationSink,
) -> Result<Option<bool>, OperationError> {
	let scan = &store.scan;
	let matcher = TermMatcher::new(criteria);
	let mut state = *cursor.lock().unwrap_or_else(PoisonError::into_inner);
	let mut batch = Vec::with_capacity(scan.batch_size);
	let mut produced = 0;

	while state.position < records.len() && produced < scan.page_size {
		if sink.is_cancelled() {
			return Ok(None);
		}
		let reference = &records[state.position];
		state.position += 1;

		let Some(item) = store.match_reference(reference, criteria, &matcher)? else {
			continue;
		};
		if state.skip > 0 {
			state.skip -= 1;
			continue;
		}

		batch.push(item);
		produced += 1;
		if batch.len() >= scan.batch_size && !sink.send_batch(mem::take(&mut batch)) {
			return Ok(None);
		}
	}

	if !batch.is_empty() && !sink.send_batch(batch) {
		return Ok(None);
	}

	if produced >= scan.page_size {
		// Stop on the next match without consuming it so the resumed page
		// starts there.
		while state.position < records.len() {
			if sink.is_cancelled() {
				return Ok(None);
			}
			if store
				.match_reference(&records[state.position], criteria, &matcher)?
				.is_some()
			{
				break;
			}
			state.position += 1;
		}
	}

	*cursor.lock().unwrap_or_else(PoisonError::into_inner) = state;
	Ok(Some(state.position < records.len()))
}

/// Run one page and turn its outcome into the completion to report. `None`
/// means the page stopped without completing. A panic becomes
/// [`OperationError::Panicked`].
fn run_page(
	page: impl FnOnce() -> Result<Option<bool>, OperationError>,
) -> Option<Completion> {
	match panic::catch_unwind(AssertUnwindSafe(page)) {
		Ok(Ok(Some(has_more))) => Some(Completion::finished(has_more)),
		Ok(Ok(None)) => None,
		Ok(Err(error)) => Some(Completion::failed(error)),
		Err(payload) => Some(Completion::failed(OperationError::Panicked {
			message: panic_message(payload.as_ref()),
		})),
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		(*message).to_string()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"unknown panic".to_string()
	}
}

/// Prepared free-text needle.
struct TermMatcher {
	needle: String,
	case_sensitive: bool,
	mode: MatchMode,
}

impl TermMatcher {
	fn new(criteria: &SearchCriteria) -> Self {
		let case_sensitive = criteria.options.case_sensitive;
		let needle = criteria.search_term.trim();
		Self {
			needle: if case_sensitive {
				needle.to_owned()
			} else {
				needle.to_lowercase()
			},
			case_sensitive,
			mode: criteria.options.match_mode,
		}
	}

	fn is_empty(&self) -> bool {
		self.needle.is_empty()
	}

	/// Byte offset of the first match in `line`.
	fn find(&self, line: &str) -> Option<usize> {
		line.char_indices()
			.map(|(offset, _)| offset)
			.find(|&offset| self.matches_at(line, offset))
	}

	fn matches_at(&self, line: &str, offset: usize) -> bool {
		if self.mode == MatchMode::WordPrefix
			&& line[..offset]
				.chars()
				.next_back()
				.is_some_and(char::is_alphanumeric)
		{
			return false;
		}

		let rest = &line[offset..];
		if self.case_sensitive {
			return rest.starts_with(&self.needle);
		}
		let mut haystack = rest.chars().flat_map(char::to_lowercase);
		self.needle.chars().all(|expected| haystack.next() == Some(expected))
	}

	fn occurrences(&self, kind: &OccurrenceKind, text: &str, found: &mut Vec<Occurrence>) {
		for (index, line) in text.lines().enumerate() {
			if let Some(offset) = self.find(line) {
				found.push(Occurrence {
					kind: kind.clone(),
					line: index + 1,
					column: line[..offset].chars().count() + 1,
					snippet: clip_snippet(line, offset),
				});
			}
		}
	}
}

fn match_record(
	record: &Record,
	criteria: &SearchCriteria,
	matcher: &TermMatcher,
) -> Option<ResultItem> {
	let filtered_out = criteria.filters().any(|filter| {
		record
			.attributes
			.get(&filter.field)
			.is_none_or(|value| !value.eq_ignore_ascii_case(&filter.value))
	});
	if filtered_out {
		return None;
	}

	if matcher.is_empty() {
		return Some(ResultItem::new(record.id.clone(), Vec::new()));
	}

	let mut fields: IndexSet<&str> = criteria
		.scopes()
		.map(|scope| scope.field.as_str())
		.collect();
	if fields.is_empty() {
		fields = IndexSet::from([TITLE_FIELD, BODY_FIELD]);
	}

	let mut occurrences = Vec::new();
	for field in fields {
		let (kind, text) = match field {
			TITLE_FIELD => (OccurrenceKind::Title, record.title.as_str()),
			BODY_FIELD => (OccurrenceKind::Body, record.body.as_str()),
			name => match record.attributes.get(name) {
				Some(value) => (OccurrenceKind::Attribute(name.to_owned()), value.as_str()),
				None => continue,
			},
		};
		matcher.occurrences(&kind, text, &mut occurrences);
	}

	if occurrences.is_empty() {
		None
	} else {
		Some(ResultItem::new(record.id.clone(), occurrences))
	}
}

/// Trim `line` to [`SNIPPET_CONTEXT`] characters around the match at `offset`.
fn clip_snippet(line: &str, offset: usize) -> String {
	let before: Vec<char> = line[..offset].chars().collect();
	let after: Vec<char> = line[offset..].chars().collect();
	let start = before.len().saturating_sub(SNIPPET_CONTEXT);
	let end = after.len().min(SNIPPET_CONTEXT * 2);

	let mut snippet = String::new();
	if start > 0 {
		snippet.push('…');
	}
	snippet.extend(&before[start..]);
	snippet.extend(&after[..end]);
	if end < after.len() {
		snippet.push('…');
	}
	snippet.trim().to_owned()
}

#[cfg(test)]
mod tests {
	use std::sync::mpsc::{self, Receiver};
	use std::time::Duration;

	use quarry_stream::{CancelToken, StreamEvent};

	use super::*;
	use crate::criteria::{FilterSpec, ScopeSpec, SearchOptions, Token};
	use crate::operation::OperationEnvelope;

	fn store_with(records: Vec<Record>, scan: ScanConfig) -> MemoryStore {
		let store = MemoryStore::new(scan);
		store.extend(records);
		store
	}

	fn run(
		store: &MemoryStore,
		criteria: SearchCriteria,
	) -> (Box<dyn SearchOperation>, Receiver<OperationEnvelope>) {
		let (tx, rx) = mpsc::channel();
		let request = OperationRequest {
			id: 1,
			criteria,
			records: store.snapshot(),
			skip: 0,
		};
		let mut operation = store.create(request, OperationSink::new(tx, 1, CancelToken::new()));
		operation.start();
		(operation, rx)
	}

	/// Collect batches until the completion arrives.
	fn collect(rx: &Receiver<OperationEnvelope>) -> (Vec<Vec<ResultItem>>, Completion) {
		let mut batches = Vec::new();
		loop {
			let envelope = rx.recv_timeout(Duration::from_secs(5)).unwrap();
			match envelope.event {
				StreamEvent::Batch(batch) => batches.push(batch),
				StreamEvent::Finished(done) => return (batches, done),
			}
		}
	}

	fn ids(batches: &[Vec<ResultItem>]) -> Vec<String> {
		batches
			.iter()
			.flatten()
			.map(|item| item.record.to_string())
			.collect()
	}

	fn numbered(count: usize) -> Vec<Record> {
		(0..count)
			.map(|index| Record::new(format!("r{index}"), format!("note {index}")))
			.collect()
	}

	#[test]
	fn matches_title_and_body_case_insensitively() {
		let store = store_with(
			vec![
				Record::new("a", "Rust Ownership").with_body("borrowing\nthe BORROW checker"),
				Record::new("b", "Swift"),
			],
			ScanConfig::default(),
		);
		let (_op, rx) = run(&store, SearchCriteria::term("borrow"));
		let (batches, done) = collect(&rx);

		assert_eq!(done, Completion::finished(false));
		assert_eq!(ids(&batches), vec!["a"]);
		let occurrences = &batches[0][0].occurrences;
		assert_eq!(occurrences.len(), 2);
		assert_eq!(occurrences[1].kind, OccurrenceKind::Body);
		assert_eq!(occurrences[1].line, 2);
		assert_eq!(occurrences[1].column, 5);
		assert_eq!(occurrences[1].snippet, "the BORROW checker");
	}

	#[test]
	fn filters_and_scopes_narrow_matches() {
		let store = store_with(
			vec![
				Record::new("a", "parser notes").with_attribute("lang", "rust"),
				Record::new("b", "parser notes").with_attribute("lang", "go"),
				Record::new("c", "misc").with_body("parser").with_attribute("lang", "Rust"),
			],
			ScanConfig::default(),
		);
		let criteria = SearchCriteria::new(
			"parser",
			vec![
				Token::Filter(FilterSpec::new("lang", "rust")),
				Token::Scope(ScopeSpec::new(TITLE_FIELD)),
			],
			SearchOptions::default(),
		);
		let (_op, rx) = run(&store, criteria);
		let (batches, _) = collect(&rx);
		assert_eq!(ids(&batches), vec!["a"]);
	}

	#[test]
	fn repeated_scopes_search_each_field_once() {
		let store = store_with(
			vec![Record::new("a", "parser").with_body("lexer")],
			ScanConfig::default(),
		);
		let criteria = SearchCriteria::new(
			"parser",
			vec![
				Token::Scope(ScopeSpec::new(TITLE_FIELD)),
				Token::Scope(ScopeSpec::new(BODY_FIELD)),
				Token::Scope(ScopeSpec::new(TITLE_FIELD)),
			],
			SearchOptions::default(),
		);
		let (_op, rx) = run(&store, criteria);
		let (batches, _) = collect(&rx);
		assert_eq!(ids(&batches), vec!["a"]);
		assert_eq!(batches[0][0].occurrences.len(), 1);
		assert_eq!(batches[0][0].occurrences[0].kind, OccurrenceKind::Title);
	}

	#[test]
	fn token_only_query_matches_without_occurrences() {
		let store = store_with(
			vec![
				Record::new("a", "x").with_attribute("kind", "bug"),
				Record::new("b", "y"),
			],
			ScanConfig::default(),
		);
		let criteria = SearchCriteria::new(
			"",
			vec![Token::Filter(FilterSpec::new("kind", "bug"))],
			SearchOptions::default(),
		);
		let (_op, rx) = run(&store, criteria);
		let (batches, _) = collect(&rx);
		assert_eq!(ids(&batches), vec!["a"]);
		assert!(batches[0][0].occurrences.is_empty());
	}

	#[test]
	fn word_prefix_mode_requires_word_start() {
		let store = store_with(
			vec![Record::new("a", "unsafe code"), Record::new("b", "safe code")],
			ScanConfig::default(),
		);
		let criteria = SearchCriteria::new(
			"safe",
			Vec::new(),
			SearchOptions {
				match_mode: MatchMode::WordPrefix,
				..SearchOptions::default()
			},
		);
		let (_op, rx) = run(&store, criteria);
		let (batches, _) = collect(&rx);
		assert_eq!(ids(&batches), vec!["b"]);
	}

	#[test]
	fn pages_and_resumes_in_discovery_order() {
		let store = store_with(
			numbered(10),
			ScanConfig {
				batch_size: 2,
				page_size: 4,
			},
		);
		let (mut operation, rx) = run(&store, SearchCriteria::term("note"));

		let (first, done) = collect(&rx);
		assert_eq!(first.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2]);
		assert_eq!(ids(&first), vec!["r0", "r1", "r2", "r3"]);
		assert!(done.has_more);

		assert!(operation.resume());
		let (second, done) = collect(&rx);
		assert_eq!(ids(&second), vec!["r4", "r5", "r6", "r7"]);
		assert!(done.has_more);

		assert!(operation.resume());
		let (third, done) = collect(&rx);
		assert_eq!(ids(&third), vec!["r8", "r9"]);
		assert!(!done.has_more);
		assert!(!operation.resume());
	}

	/// Ten records where only the listed positions mention "note".
	fn sparse(matching: &[usize]) -> Vec<Record> {
		(0..10)
			.map(|index| {
				let title = if matching.contains(&index) { "note" } else { "other" };
				Record::new(format!("r{index}"), title)
			})
			.collect()
	}

	#[test]
	fn full_page_on_the_last_match_has_no_more() {
		let store = store_with(
			sparse(&[0, 1, 2, 3]),
			ScanConfig {
				batch_size: 2,
				page_size: 4,
			},
		);
		let (mut operation, rx) = run(&store, SearchCriteria::term("note"));

		let (batches, done) = collect(&rx);
		assert_eq!(ids(&batches), vec!["r0", "r1", "r2", "r3"]);
		assert_eq!(done, Completion::finished(false));
		assert!(!operation.resume());
	}

	#[test]
	fn full_page_reports_more_when_a_later_record_matches() {
		let store = store_with(
			sparse(&[0, 1, 2, 3, 9]),
			ScanConfig {
				batch_size: 2,
				page_size: 4,
			},
		);
		let (mut operation, rx) = run(&store, SearchCriteria::term("note"));

		let (_, done) = collect(&rx);
		assert!(done.has_more);

		assert!(operation.resume());
		let (batches, done) = collect(&rx);
		assert_eq!(ids(&batches), vec!["r9"]);
		assert_eq!(done, Completion::finished(false));
	}

	#[test]
	fn skip_continues_after_shown_results() {
		let store = store_with(numbered(5), ScanConfig::default());
		let (tx, rx) = mpsc::channel();
		let request = OperationRequest {
			id: 2,
			criteria: SearchCriteria::term("note"),
			records: store.snapshot(),
			skip: 3,
		};
		let mut operation = store.create(request, OperationSink::new(tx, 2, CancelToken::new()));
		operation.start();
		let (batches, _) = collect(&rx);
		assert_eq!(ids(&batches), vec!["r3", "r4"]);
	}

	#[test]
	fn cancelled_scan_never_completes() {
		let store = store_with(numbered(50), ScanConfig::default());
		let (tx, rx) = mpsc::channel();
		let request = OperationRequest {
			id: 3,
			criteria: SearchCriteria::term("note"),
			records: store.snapshot(),
			skip: 0,
		};
		let mut operation = store.create(request, OperationSink::new(tx, 3, CancelToken::new()));
		operation.cancel();
		operation.start();
		operation.cancel();
		assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
	}

	#[test]
	fn poisoned_store_fails_the_scan() {
		let store = store_with(numbered(3), ScanConfig::default());
		let records = Arc::clone(&store.records);
		let poisoner = thread::spawn(move || {
			let _guard = records.write().unwrap();
			panic!("poison the record lock");
		});
		assert!(poisoner.join().is_err());

		let (_op, rx) = run(&store, SearchCriteria::term("note"));
		let (batches, done) = collect(&rx);
		assert!(batches.is_empty());
		assert_eq!(
			done,
			Completion::failed(OperationError::Scan {
				reason: "record store lock poisoned".to_string(),
			})
		);
	}

	#[test]
	fn panicking_page_reports_the_panic_message() {
		let completion = run_page(|| panic!("boom"));
		assert_eq!(
			completion,
			Some(Completion::failed(OperationError::Panicked {
				message: "boom".to_string(),
			}))
		);

		let formatted = run_page(|| panic!("bad record {}", 7));
		assert_eq!(
			formatted,
			Some(Completion::failed(OperationError::Panicked {
				message: "bad record 7".to_string(),
			}))
		);
	}

	#[test]
	fn stopped_page_reports_nothing() {
		assert_eq!(run_page(|| Ok(None)), None);
		assert_eq!(run_page(|| Ok(Some(true))), Some(Completion::finished(true)));
	}

	#[test]
	fn snapshot_ignores_records_added_later() {
		let store = store_with(numbered(2), ScanConfig::default());
		let snapshot = store.snapshot();
		store.insert(Record::new("late", "note late"));
		assert_eq!(snapshot.len(), 2);
		assert_eq!(store.len(), 3);
	}

	#[test]
	fn attribute_values_are_sorted_and_unique() {
		let store = store_with(
			vec![
				Record::new("a", "").with_attribute("lang", "rust"),
				Record::new("b", "").with_attribute("lang", "go"),
				Record::new("c", "").with_attribute("lang", "rust"),
			],
			ScanConfig::default(),
		);
		assert_eq!(store.attribute_values("lang"), vec!["go", "rust"]);
	}

	#[test]
	fn long_lines_are_clipped_around_the_match() {
		let line = format!("{}needle{}", "a".repeat(60), "b".repeat(100));
		let snippet = clip_snippet(&line, 60);
		assert!(snippet.starts_with('…'));
		assert!(snippet.ends_with('…'));
		assert!(snippet.contains("needle"));
		assert_eq!(snippet.chars().count(), 40 + 80 + 2);
	}
}
