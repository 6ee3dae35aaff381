use std::io;

use thiserror::Error;

/// Failure reported by a search operation in place of a normal completion.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OperationError {
	/// The data store could not scan the requested records.
	#[error("search scan failed: {reason}")]
	Scan { reason: String },

	/// The scan worker panicked before finishing.
	#[error("search worker panicked: {message}")]
	Panicked { message: String },
}

/// Errors raised by a [`BlobStore`](crate::BlobStore) slot.
#[derive(Debug, Error)]
pub enum BlobStoreError {
	#[error("failed to read blob slot '{key}'")]
	Read {
		key: String,
		#[source]
		source: io::Error,
	},

	#[error("failed to write blob slot '{key}'")]
	Write {
		key: String,
		#[source]
		source: io::Error,
	},
}

/// Errors raised while persisting the recent-search list.
///
/// These never roll back the in-memory change that triggered them.
#[derive(Debug, Error)]
pub enum HistoryError {
	#[error("failed to encode search history")]
	Encode(#[from] serde_json::Error),

	#[error("failed to persist search history")]
	Persist(#[from] BlobStoreError),
}
