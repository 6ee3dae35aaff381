//! Contract between the session and the data store that runs searches.
//!
//! A data store implements [`OperationSource`]. For every query the session
//! asks it for a [`SearchOperation`] and hands over an [`OperationSink`], the
//! channel through which the operation reports result batches and its single
//! [`Completion`]. Delivery goes through an [`mpsc`](std::sync::mpsc) channel
//! that the session drains on its own thread, so the scan itself may run
//! anywhere.

use std::fmt;
use std::sync::Arc;

use quarry_stream::{DataStream, StreamEnvelope};
use serde::{Deserialize, Serialize};

use crate::criteria::SearchCriteria;
use crate::error::OperationError;

/// Generation number identifying one operation within a session.
pub type OperationId = u64;

/// Stable identifier of a record owned by the data store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordRef(String);

impl RecordRef {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl From<&str> for RecordRef {
	fn from(id: &str) -> Self {
		Self::new(id)
	}
}

impl From<String> for RecordRef {
	fn from(id: String) -> Self {
		Self(id)
	}
}

impl fmt::Display for RecordRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Immutable, cheaply cloned list of record identifiers to search over.
pub type RecordSnapshot = Arc<[RecordRef]>;

/// Part of a record a match was found in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum OccurrenceKind {
	Title,
	Body,
	/// Value of the named attribute.
	Attribute(String),
}

/// One place where the free text matched inside a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
	pub kind: OccurrenceKind,
	/// 1-based line within the field.
	pub line: usize,
	/// 1-based character column of the match start.
	pub column: usize,
	/// The matching line, clipped around the match.
	pub snippet: String,
}

/// A matching record and where it matched.
///
/// The record itself stays owned by the data store; only its identifier is
/// carried here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultItem {
	pub record: RecordRef,
	pub occurrences: Vec<Occurrence>,
}

impl ResultItem {
	pub fn new(record: impl Into<RecordRef>, occurrences: Vec<Occurrence>) -> Self {
		Self {
			record: record.into(),
			occurrences,
		}
	}
}

/// Terminal report of one run of an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
	/// Whether a continuation could produce further results.
	pub has_more: bool,
	/// Set when the run failed instead of finishing normally.
	pub error: Option<OperationError>,
}

impl Completion {
	#[must_use]
	pub fn finished(has_more: bool) -> Self {
		Self {
			has_more,
			error: None,
		}
	}

	#[must_use]
	pub fn failed(error: OperationError) -> Self {
		Self {
			has_more: false,
			error: Some(error),
		}
	}
}

/// Message delivered from an operation to its session.
pub type OperationEnvelope = StreamEnvelope<Vec<ResultItem>, Completion>;

/// Producer side of the session channel, bound to one operation.
pub type OperationSink = DataStream<Vec<ResultItem>, Completion>;

/// Everything a data store needs to create an operation.
#[derive(Debug, Clone)]
pub struct OperationRequest {
	pub id: OperationId,
	pub criteria: SearchCriteria,
	/// Snapshot captured when the operation was requested. Later changes to the
	/// session's target set do not affect it.
	pub records: RecordSnapshot,
	/// Matches to skip before reporting, used for continuations of operations
	/// that cannot resume in place.
	pub skip: usize,
}

/// One cancellable unit of search work.
///
/// Implementations report through the [`OperationSink`] they were created
/// with: zero or more non-empty batches in discovery order, then exactly one
/// [`Completion`] unless cancelled first. After [`cancel`](Self::cancel)
/// returns, nothing further may be sent. Implementations get this by tripping
/// the sink's token in `cancel`: tripping waits for a send in progress, and
/// the sink refuses every send after it.
pub trait SearchOperation: Send {
	fn id(&self) -> OperationId;

	/// Begin producing results. Must not block on the scan.
	fn start(&mut self);

	/// Request cancellation. Idempotent, and harmless before `start` or after
	/// completion.
	fn cancel(&mut self);

	/// Continue a finished run from where it stopped, reporting through the same
	/// sink. Returns `false` when the operation cannot resume, in which case the
	/// caller issues a continuation request instead.
	fn resume(&mut self) -> bool {
		false
	}
}

/// Data store collaborator able to create operations.
pub trait OperationSource {
	fn create(&self, request: OperationRequest, sink: OperationSink) -> Box<dyn SearchOperation>;
}

impl<T: OperationSource + ?Sized> OperationSource for Arc<T> {
	fn create(&self, request: OperationRequest, sink: OperationSink) -> Box<dyn SearchOperation> {
		(**self).create(request, sink)
	}
}
