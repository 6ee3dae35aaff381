//! Incremental, cancellable search-as-you-type orchestration.
//!
//! The crate revolves around [`SearchSession`], which accepts a stream of
//! criteria edits, owns at most one in-flight [`SearchOperation`], and
//! reconciles the batches it produces into a flicker-free result list. The
//! data store, the persistence slot for recent searches, and token
//! classification are collaborators expressed as traits so that embedders can
//! plug in their own implementations; [`MemoryStore`], [`FileBlobStore`] and
//! the classifiers in [`suggest`] are ready-made ones.

pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod criteria;
pub mod error;
pub mod history;
pub mod operation;
mod reconcile;
pub mod session;
pub mod store;
pub mod suggest;

pub use app_dirs::AppDir;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{HistoryConfig, ScanConfig, SessionConfig};
pub use criteria::{
	CriteriaChange, CriteriaStream, FilterSpec, MatchMode, ScopeSpec, SearchCriteria,
	SearchOptions, Token,
};
pub use error::{BlobStoreError, HistoryError, OperationError};
pub use history::{BlobStore, FileBlobStore, HISTORY_BLOB_KEY, HistoryStore, MemoryBlobStore};
pub use operation::{
	Completion, Occurrence, OccurrenceKind, OperationEnvelope, OperationId, OperationRequest,
	OperationSink, OperationSource, RecordRef, RecordSnapshot, ResultItem, SearchOperation,
};
pub use session::{SearchSession, SessionMessage};
pub use store::{MemoryStore, Record};
pub use suggest::{
	AttributeClassifier, CriteriaClassifier, ScopeClassifier, SuggestionEngine, Suggestions,
};
