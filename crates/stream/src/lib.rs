//! Streaming primitives for delivering search batches across threads.
//!
//! A background producer holds a [`DataStream`] bound to the identifier of the
//! operation it serves. Each message travels through an [`mpsc`] channel as a
//! [`StreamEnvelope`] so the consumer can apply it on its own thread, and the
//! identifier lets the consumer discard envelopes from producers it no longer
//! cares about.
//!
//! Every stream carries a [`CancelToken`]. Checking the token and sending
//! happen under the token's lock, and [`CancelToken::cancel`] waits for sends
//! already in progress. Once `cancel` returns, no stream sharing the token
//! delivers another message.
//!
//! ```
//! use std::sync::mpsc;
//!
//! use quarry_stream::{CancelToken, DataStream, StreamEvent};
//!
//! let (tx, rx) = mpsc::channel();
//! let token = CancelToken::new();
//! let stream: DataStream<Vec<u32>, bool> = DataStream::new(tx, 7, token.clone());
//!
//! assert!(stream.send_batch(vec![1, 2]));
//! token.cancel();
//! assert!(!stream.finish(false));
//!
//! let envelope = rx.recv().unwrap();
//! assert_eq!(envelope.id, 7);
//! assert!(matches!(envelope.event, StreamEvent::Batch(ref items) if items == &[1, 2]));
//! assert!(rx.try_recv().is_err());
//! ```
//!
//! [`mpsc`]: std::sync::mpsc

use std::fmt;
use std::sync::mpsc::Sender;
use std::sync::{Arc, PoisonError, RwLock};

/// Cooperative cancellation flag shared between a consumer and its producer.
///
/// Cancelling is idempotent and may happen before the producer starts or after
/// it has already finished. Work guarded by [`CancelToken::unless_cancelled`]
/// holds a shared lock, so cancelling waits for it and the two never overlap.
#[derive(Clone, Default)]
pub struct CancelToken {
	cancelled: Arc<RwLock<bool>>,
}

impl CancelToken {
	/// Create a token that has not been cancelled.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Request cancellation. Returns once guarded work in progress is done.
	pub fn cancel(&self) {
		*self.cancelled.write().unwrap_or_else(PoisonError::into_inner) = true;
	}

	/// Whether cancellation was requested.
	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		*self.cancelled.read().unwrap_or_else(PoisonError::into_inner)
	}

	/// Run `work` unless cancellation was requested, keeping `cancel` blocked
	/// until it returns.
	pub fn unless_cancelled<R>(&self, work: impl FnOnce() -> R) -> Option<R> {
		let cancelled = self.cancelled.read().unwrap_or_else(PoisonError::into_inner);
		if *cancelled { None } else { Some(work()) }
	}
}

impl fmt::Debug for CancelToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CancelToken")
			.field("cancelled", &self.is_cancelled())
			.finish()
	}
}

/// Message produced by a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent<B, F> {
	/// Incremental payload. Zero or more of these precede the completion.
	Batch(B),
	/// Terminal payload. At most one per run of the producer.
	Finished(F),
}

/// Message emitted by a background producer and delivered to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEnvelope<B, F> {
	/// Identifier correlating the message with the operation that produced it.
	pub id: u64,
	/// Payload delivered to the consumer.
	pub event: StreamEvent<B, F>,
}

impl<B, F> StreamEnvelope<B, F> {
	/// Whether this envelope terminates its stream.
	#[must_use]
	pub fn is_complete(&self) -> bool {
		matches!(self.event, StreamEvent::Finished(_))
	}

	/// Transform the batch payload while preserving the envelope metadata.
	pub fn map_batch<N>(self, f: impl FnOnce(B) -> N) -> StreamEnvelope<N, F> {
		let event = match self.event {
			StreamEvent::Batch(batch) => StreamEvent::Batch(f(batch)),
			StreamEvent::Finished(done) => StreamEvent::Finished(done),
		};
		StreamEnvelope { id: self.id, event }
	}
}

/// Handle for producing stream messages backed by an [`mpsc::Sender`].
///
/// [`mpsc::Sender`]: std::sync::mpsc::Sender
pub struct DataStream<B, F> {
	tx: Sender<StreamEnvelope<B, F>>,
	id: u64,
	cancel: CancelToken,
}

impl<B: Send + 'static, F: Send + 'static> DataStream<B, F> {
	/// Create a new handle backed by the provided sender.
	#[must_use]
	pub fn new(tx: Sender<StreamEnvelope<B, F>>, id: u64, cancel: CancelToken) -> Self {
		Self { tx, id, cancel }
	}

	/// Identifier associated with this stream.
	#[must_use]
	pub fn id(&self) -> u64 {
		self.id
	}

	/// Token observed before every send.
	#[must_use]
	pub fn cancel_token(&self) -> &CancelToken {
		&self.cancel
	}

	/// Whether the consumer asked this stream to stop.
	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// Emit an incremental batch.
	///
	/// Returns `false` when the stream was cancelled or the consumer hung up;
	/// producers should stop scanning in either case.
	pub fn send_batch(&self, batch: B) -> bool {
		self.send(StreamEvent::Batch(batch))
	}

	/// Emit the terminal message for this run.
	///
	/// Returns `false` without sending when the stream was cancelled.
	pub fn finish(&self, done: F) -> bool {
		self.send(StreamEvent::Finished(done))
	}

	fn send(&self, event: StreamEvent<B, F>) -> bool {
		self.cancel
			.unless_cancelled(|| self.tx.send(StreamEnvelope { id: self.id, event }).is_ok())
			.unwrap_or(false)
	}
}

impl<B, F> Clone for DataStream<B, F> {
	fn clone(&self) -> Self {
		Self {
			tx: self.tx.clone(),
			id: self.id,
			cancel: self.cancel.clone(),
		}
	}
}

impl<B, F> fmt::Debug for DataStream<B, F> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DataStream")
			.field("id", &self.id)
			.field("cancel", &self.cancel)
			.finish_non_exhaustive()
	}
}
