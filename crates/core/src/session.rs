//! Search session: the single owner of the in-flight operation.
//!
//! The [`SearchSession`] reacts to criteria changes by cancelling the current
//! [`SearchOperation`] and starting a new one over the current record
//! snapshot. Operations report through a channel that the session drains on
//! its own thread ([`SearchSession::pump`]), so all state changes happen in
//! one place and need no locking. Every envelope is checked against the
//! identifier of the active operation; anything else is stale and dropped.
//!
//! Presentation code reads [`results`](SearchSession::results),
//! [`is_searching`](SearchSession::is_searching) and
//! [`has_more`](SearchSession::has_more), and can watch
//! [`revision`](SearchSession::revision) to learn when any of them changed.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use quarry_stream::{CancelToken, StreamEvent};

use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::criteria::{CriteriaChange, CriteriaStream, SearchCriteria, SearchOptions, Token};
use crate::error::{HistoryError, OperationError};
use crate::history::{BlobStore, HistoryStore};
use crate::operation::{
	Completion, OperationEnvelope, OperationId, OperationRequest, OperationSink, OperationSource,
	RecordSnapshot, ResultItem, SearchOperation,
};
use crate::reconcile::ResultReconciler;
use crate::suggest::{SuggestionEngine, Suggestions};

/// Longest single wait inside [`SearchSession::wait_idle`] before the staging
/// timer is re-checked.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Input understood by the session event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMessage {
	/// Raw free text as typed.
	TextEdited(String),
	/// Full replacement of the token list.
	TokensEdited(Vec<Token>),
	/// Text and tokens replaced together as a single edit.
	CriteriaChanged(CriteriaChange),
	LoadMore,
	/// Drain operation output and run timers.
	Tick,
}

/// Operation owned by the session, running or finished.
struct OperationSlot {
	handle: Box<dyn SearchOperation>,
	criteria: SearchCriteria,
	records: RecordSnapshot,
	finished: bool,
}

impl OperationSlot {
	fn id(&self) -> OperationId {
		self.handle.id()
	}
}

pub struct SearchSession<S> {
	source: S,
	config: SessionConfig,
	options: SearchOptions,
	clock: Arc<dyn Clock>,
	criteria: CriteriaStream,
	targets: RecordSnapshot,
	operation: Option<OperationSlot>,
	next_id: OperationId,
	tx: Sender<OperationEnvelope>,
	rx: Receiver<OperationEnvelope>,
	reconciler: ResultReconciler,
	is_searching: bool,
	has_more: bool,
	last_error: Option<OperationError>,
	revision: u64,
}

impl<S: OperationSource> SearchSession<S> {
	pub fn new(source: S, config: SessionConfig) -> Self {
		let (tx, rx) = mpsc::channel();
		Self {
			source,
			criteria: CriteriaStream::new(config.debounce()),
			config,
			options: SearchOptions::default(),
			clock: Arc::new(SystemClock),
			targets: RecordSnapshot::from([]),
			operation: None,
			next_id: 0,
			tx,
			rx,
			reconciler: ResultReconciler::default(),
			is_searching: false,
			has_more: false,
			last_error: None,
			revision: 0,
		}
	}

	#[must_use]
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	/// Options applied to every query of this session.
	#[must_use]
	pub fn with_options(mut self, options: SearchOptions) -> Self {
		self.options = options;
		self
	}

	/// Visible results, in the order they were produced.
	#[must_use]
	pub fn results(&self) -> &[ResultItem] {
		self.reconciler.results()
	}

	#[must_use]
	pub fn is_searching(&self) -> bool {
		self.is_searching
	}

	/// Whether [`load_more`](Self::load_more) can produce further results.
	#[must_use]
	pub fn has_more(&self) -> bool {
		self.has_more
	}

	/// Failure reported by the most recent operation, if it failed.
	#[must_use]
	pub fn last_error(&self) -> Option<&OperationError> {
		self.last_error.as_ref()
	}

	/// Criteria of the current or most recently finished operation.
	#[must_use]
	pub fn active_criteria(&self) -> Option<&SearchCriteria> {
		self.operation.as_ref().map(|slot| &slot.criteria)
	}

	/// Identifier of the running operation.
	#[must_use]
	pub fn active_operation_id(&self) -> Option<OperationId> {
		self.operation
			.as_ref()
			.filter(|slot| !slot.finished)
			.map(OperationSlot::id)
	}

	/// Whether new results are being held back to avoid flicker.
	#[must_use]
	pub fn is_staging(&self) -> bool {
		self.reconciler.is_staging()
	}

	/// Results held back while staging.
	#[must_use]
	pub fn staged(&self) -> &[ResultItem] {
		self.reconciler.staged()
	}

	/// Counter bumped whenever results, `is_searching` or `has_more` change.
	#[must_use]
	pub fn revision(&self) -> u64 {
		self.revision
	}

	#[must_use]
	pub fn target_records(&self) -> &RecordSnapshot {
		&self.targets
	}

	/// Free text as of the last edit.
	#[must_use]
	pub fn text(&self) -> &str {
		self.criteria.text()
	}

	/// Tokens as of the last edit.
	#[must_use]
	pub fn tokens(&self) -> &[Token] {
		self.criteria.tokens()
	}

	/// Replace the identifiers the next operation searches over. The running
	/// operation keeps the snapshot it started with.
	pub fn set_target_record_set(&mut self, records: impl Into<RecordSnapshot>) {
		self.targets = records.into();
	}

	/// Route one message through the session.
	pub fn dispatch(&mut self, message: SessionMessage) {
		match message {
			SessionMessage::TextEdited(text) => {
				self.edit_text(&text);
			}
			SessionMessage::TokensEdited(tokens) => {
				self.edit_tokens(tokens);
			}
			SessionMessage::CriteriaChanged(change) => {
				self.edit(&change.text, change.tokens);
			}
			SessionMessage::LoadMore => {
				self.load_more();
			}
			SessionMessage::Tick => {
				self.pump();
				self.tick();
			}
		}
	}

	/// Feed raw text through the criteria stream. Returns whether a search
	/// update was applied.
	pub fn edit_text(&mut self, raw: &str) -> bool {
		let change = self.criteria.edit_text(raw, self.clock.now());
		self.apply_change(change)
	}

	pub fn edit_tokens(&mut self, tokens: Vec<Token>) -> bool {
		let change = self.criteria.edit_tokens(tokens, self.clock.now());
		self.apply_change(change)
	}

	pub fn edit(&mut self, raw: &str, tokens: Vec<Token>) -> bool {
		let change = self.criteria.edit(raw, tokens, self.clock.now());
		self.apply_change(change)
	}

	fn apply_change(&mut self, change: Option<CriteriaChange>) -> bool {
		match change {
			Some(change) => {
				self.restart_search(change.text, change.tokens);
				true
			}
			None => false,
		}
	}

	/// Cancel the running operation and start one for a change released by the
	/// criteria stream.
	///
	/// Text shorter than [`SessionConfig::min_query_chars`] without tokens
	/// clears the results instead of searching.
	fn restart_search(&mut self, text: String, tokens: Vec<Token>) {
		self.cancel_operation();
		self.last_error = None;

		if text.chars().count() < self.config.min_query_chars && tokens.is_empty() {
			debug!("query {text:?} below minimum length, clearing results");
			self.reconciler.clear();
			self.is_searching = false;
			self.has_more = false;
			self.bump();
			return;
		}

		self.is_searching = true;
		self.has_more = false;
		self.reconciler.restart(self.clock.now());
		let criteria = SearchCriteria::new(text, tokens, self.options);
		let records = Arc::clone(&self.targets);
		self.start_operation(criteria, records, 0);
		self.bump();
	}

	/// Continue the finished operation. Returns `false` without side effects
	/// unless `has_more` is set and nothing is running.
	pub fn load_more(&mut self) -> bool {
		if !self.has_more || self.is_searching {
			return false;
		}
		let Some(slot) = self.operation.as_mut() else {
			return false;
		};

		if slot.handle.resume() {
			debug!("resumed operation {}", slot.id());
			slot.finished = false;
		} else {
			let criteria = slot.criteria.clone();
			let records = Arc::clone(&slot.records);
			let skip = self.reconciler.results().len();
			self.cancel_operation();
			self.start_operation(criteria, records, skip);
		}

		self.is_searching = true;
		self.last_error = None;
		self.bump();
		true
	}

	/// Apply a batch reported by operation `id`. Stale batches are ignored.
	pub fn on_operation_produced(&mut self, id: OperationId, batch: Vec<ResultItem>) {
		if !self.is_current(id) {
			trace!("dropping stale batch from operation {id}");
			return;
		}
		if batch.is_empty() {
			return;
		}
		let now = self.clock.now();
		if self
			.reconciler
			.absorb(batch, now, self.config.flicker_window())
		{
			self.bump();
		}
	}

	/// Apply the completion of operation `id`. Stale completions are ignored.
	pub fn on_operation_finished(&mut self, id: OperationId, completion: Completion) {
		if !self.is_current(id) {
			trace!("dropping stale completion from operation {id}");
			return;
		}
		if let Some(slot) = self.operation.as_mut() {
			slot.finished = true;
		}

		self.is_searching = false;
		self.reconciler.finish();
		self.has_more = completion.has_more;
		if let Some(error) = completion.error {
			warn!("operation {id} failed: {error}");
			self.has_more = false;
			self.last_error = Some(error);
		}
		self.bump();
	}

	/// Drain operation output waiting on the channel. Returns the number of
	/// envelopes examined, stale ones included.
	pub fn pump(&mut self) -> usize {
		let mut drained = 0;
		while let Ok(envelope) = self.rx.try_recv() {
			self.apply_envelope(envelope);
			drained += 1;
		}
		drained
	}

	/// Run time-driven work: release a debounced edit and flush staged results
	/// whose window has elapsed.
	pub fn tick(&mut self) {
		let now = self.clock.now();
		let change = self.criteria.poll(now);
		self.apply_change(change);
		if self
			.reconciler
			.flush_if_elapsed(now, self.config.flicker_window())
		{
			self.bump();
		}
	}

	/// Block the calling thread until the running operation finishes or
	/// `timeout` passes. Returns whether the session is idle.
	pub fn wait_idle(&mut self, timeout: Duration) -> bool {
		let deadline = Instant::now() + timeout;
		self.pump();
		while self.is_searching {
			let remaining = deadline.saturating_duration_since(Instant::now());
			if remaining.is_zero() {
				return false;
			}
			match self.rx.recv_timeout(remaining.min(IDLE_POLL_INTERVAL)) {
				Ok(envelope) => self.apply_envelope(envelope),
				Err(RecvTimeoutError::Timeout) => {}
				Err(RecvTimeoutError::Disconnected) => return false,
			}
			self.tick();
		}
		true
	}

	/// Remember the current criteria as a successful search.
	pub fn submit<B: BlobStore>(
		&self,
		history: &mut HistoryStore<B>,
	) -> Result<bool, HistoryError> {
		match self.active_criteria() {
			Some(criteria) => history.record_successful_search(criteria.clone()),
			None => Ok(false),
		}
	}

	/// Suggested tokens for the current free text.
	#[must_use]
	pub fn suggestions(&self, engine: &SuggestionEngine) -> Suggestions {
		engine.suggest(self.criteria.text(), self.criteria.tokens())
	}

	fn apply_envelope(&mut self, envelope: OperationEnvelope) {
		match envelope.event {
			StreamEvent::Batch(batch) => self.on_operation_produced(envelope.id, batch),
			StreamEvent::Finished(completion) => {
				self.on_operation_finished(envelope.id, completion);
			}
		}
	}

	fn is_current(&self, id: OperationId) -> bool {
		self.operation
			.as_ref()
			.is_some_and(|slot| !slot.finished && slot.id() == id)
	}

	fn start_operation(&mut self, criteria: SearchCriteria, records: RecordSnapshot, skip: usize) {
		self.next_id = self.next_id.wrapping_add(1);
		let id = self.next_id;
		let sink = OperationSink::new(self.tx.clone(), id, CancelToken::new());
		let request = OperationRequest {
			id,
			criteria: criteria.clone(),
			records: Arc::clone(&records),
			skip,
		};
		debug!(
			"starting operation {id} for {:?} over {} records",
			criteria.search_term,
			records.len()
		);

		let mut handle = self.source.create(request, sink);
		handle.start();
		self.operation = Some(OperationSlot {
			handle,
			criteria,
			records,
			finished: false,
		});
	}

	fn cancel_operation(&mut self) {
		if let Some(mut slot) = self.operation.take() {
			if !slot.finished {
				debug!("cancelling operation {}", slot.id());
			}
			slot.handle.cancel();
		}
	}

	fn bump(&mut self) {
		self.revision = self.revision.wrapping_add(1);
	}
}
