//! Recent-search list persisted through a key-value blob slot.
//!
//! The list holds at most one entry per search term and keeps the most recent
//! submission last in storage order. Every mutation rewrites the whole list
//! into the [`HISTORY_BLOB_KEY`] slot as a JSON array of criteria. A missing or
//! unreadable slot yields an empty list.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use log::warn;

use crate::config::HistoryConfig;
use crate::criteria::SearchCriteria;
use crate::error::{BlobStoreError, HistoryError};

/// Slot holding the serialized recent-search list.
pub const HISTORY_BLOB_KEY: &str = "recent-searches";

/// Key-value storage for opaque byte blobs.
pub trait BlobStore {
	fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobStoreError>;

	fn set(&self, key: &str, bytes: &[u8]) -> Result<(), BlobStoreError>;
}

/// Blob store kept in memory. Clones share their slots.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
	slots: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}
}

impl BlobStore for MemoryBlobStore {
	fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobStoreError> {
		let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
		Ok(slots.get(key).cloned())
	}

	fn set(&self, key: &str, bytes: &[u8]) -> Result<(), BlobStoreError> {
		let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
		slots.insert(key.to_owned(), bytes.to_vec());
		Ok(())
	}
}

/// Blob store writing one `<key>.json` file per slot inside a directory.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
	dir: PathBuf,
}

impl FileBlobStore {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into() }
	}

	#[must_use]
	pub fn dir(&self) -> &Path {
		&self.dir
	}

	fn slot_path(&self, key: &str) -> PathBuf {
		self.dir.join(format!("{key}.json"))
	}
}

impl BlobStore for FileBlobStore {
	fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobStoreError> {
		match fs::read(self.slot_path(key)) {
			Ok(bytes) => Ok(Some(bytes)),
			Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
			Err(source) => Err(BlobStoreError::Read {
				key: key.to_owned(),
				source,
			}),
		}
	}

	fn set(&self, key: &str, bytes: &[u8]) -> Result<(), BlobStoreError> {
		write_slot(&self.dir, &self.slot_path(key), bytes).map_err(|source| BlobStoreError::Write {
			key: key.to_owned(),
			source,
		})
	}
}

fn write_slot(dir: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
	fs::create_dir_all(dir)?;
	let tmp_path = path.with_extension("tmp");
	{
		let mut file = fs::File::create(&tmp_path)?;
		file.write_all(bytes)?;
		file.sync_all().ok();
	}
	fs::rename(&tmp_path, path)
}

/// Serialize entries in storage order.
pub fn encode(entries: &[SearchCriteria]) -> Result<Vec<u8>, serde_json::Error> {
	serde_json::to_vec(entries)
}

pub fn decode(bytes: &[u8]) -> Result<Vec<SearchCriteria>, serde_json::Error> {
	serde_json::from_slice(bytes)
}

/// Bounded, term-deduplicated list of past successful searches.
pub struct HistoryStore<B> {
	blob: B,
	/// Oldest first.
	entries: Vec<SearchCriteria>,
	capacity: usize,
}

impl<B: BlobStore> HistoryStore<B> {
	/// Load the list from `blob`, falling back to an empty one.
	pub fn open(blob: B, config: &HistoryConfig) -> Self {
		let mut entries = match blob.get(HISTORY_BLOB_KEY) {
			Ok(Some(bytes)) => decode(&bytes).unwrap_or_else(|err| {
				warn!("discarding unreadable search history: {err}");
				Vec::new()
			}),
			Ok(None) => Vec::new(),
			Err(err) => {
				warn!("search history unavailable: {err}");
				Vec::new()
			}
		};
		let overflow = entries.len().saturating_sub(config.capacity);
		entries.drain(..overflow);

		Self {
			blob,
			entries,
			capacity: config.capacity,
		}
	}

	/// Remember a submitted search as the most recent one.
	///
	/// Earlier entries with the same term are removed first. Blank terms are
	/// ignored and return `Ok(false)`. The list is updated even when persisting
	/// it fails.
	pub fn record_successful_search(
		&mut self,
		criteria: SearchCriteria,
	) -> Result<bool, HistoryError> {
		if criteria.search_term.trim().is_empty() {
			return Ok(false);
		}
		self.entries
			.retain(|entry| entry.search_term != criteria.search_term);
		self.entries.push(criteria);
		let overflow = self.entries.len().saturating_sub(self.capacity);
		self.entries.drain(..overflow);
		self.persist()?;
		Ok(true)
	}

	/// Entries, most recent first.
	pub fn list(&self) -> impl Iterator<Item = &SearchCriteria> {
		self.entries.iter().rev()
	}

	/// Look up the stored entry for a term without changing its recency.
	#[must_use]
	pub fn select_entry(&self, criteria: &SearchCriteria) -> Option<&SearchCriteria> {
		self.entries
			.iter()
			.find(|entry| entry.search_term == criteria.search_term)
	}

	pub fn clear(&mut self) -> Result<(), HistoryError> {
		self.entries.clear();
		self.persist()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	#[must_use]
	pub fn blob(&self) -> &B {
		&self.blob
	}

	fn persist(&self) -> Result<(), HistoryError> {
		let bytes = encode(&self.entries)?;
		self.blob.set(HISTORY_BLOB_KEY, &bytes).map_err(|err| {
			warn!("failed to persist search history: {err}");
			HistoryError::from(err)
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::criteria::{FilterSpec, SearchOptions, Token};

	fn open(blob: &MemoryBlobStore) -> HistoryStore<MemoryBlobStore> {
		HistoryStore::open(blob.clone(), &HistoryConfig::default())
	}

	fn terms<B: BlobStore>(history: &HistoryStore<B>) -> Vec<&str> {
		history
			.list()
			.map(|entry| entry.search_term.as_str())
			.collect()
	}

	#[test]
	fn duplicate_term_moves_to_most_recent() {
		let mut history = open(&MemoryBlobStore::new());
		history.record_successful_search(SearchCriteria::term("foo")).unwrap();
		history.record_successful_search(SearchCriteria::term("bar")).unwrap();
		history.record_successful_search(SearchCriteria::term("foo")).unwrap();

		assert_eq!(terms(&history), vec!["foo", "bar"]);
	}

	#[test]
	fn same_term_with_new_tokens_replaces_entry() {
		let mut history = open(&MemoryBlobStore::new());
		history.record_successful_search(SearchCriteria::term("foo")).unwrap();
		let refined = SearchCriteria::new(
			"foo",
			vec![Token::Filter(FilterSpec::new("lang", "rust"))],
			SearchOptions::default(),
		);
		history.record_successful_search(refined.clone()).unwrap();

		assert_eq!(history.len(), 1);
		assert_eq!(history.list().next(), Some(&refined));
	}

	#[test]
	fn blank_terms_are_ignored() {
		let blob = MemoryBlobStore::new();
		let mut history = open(&blob);
		assert!(!history.record_successful_search(SearchCriteria::term("   ")).unwrap());
		assert!(history.is_empty());
		assert!(blob.get(HISTORY_BLOB_KEY).unwrap().is_none());
	}

	#[test]
	fn capacity_drops_oldest() {
		let config = HistoryConfig { capacity: 2 };
		let mut history = HistoryStore::open(MemoryBlobStore::new(), &config);
		for term in ["a1", "b2", "c3"] {
			history.record_successful_search(SearchCriteria::term(term)).unwrap();
		}
		assert_eq!(terms(&history), vec!["c3", "b2"]);
	}

	#[test]
	fn select_entry_does_not_bump_recency() {
		let mut history = open(&MemoryBlobStore::new());
		history.record_successful_search(SearchCriteria::term("old")).unwrap();
		history.record_successful_search(SearchCriteria::term("new")).unwrap();

		let selected = history.select_entry(&SearchCriteria::term("old")).cloned();
		assert_eq!(selected, Some(SearchCriteria::term("old")));
		assert_eq!(terms(&history), vec!["new", "old"]);
		assert!(history.select_entry(&SearchCriteria::term("missing")).is_none());
	}

	#[test]
	fn mutations_persist_and_reload() {
		let blob = MemoryBlobStore::new();
		{
			let mut history = open(&blob);
			history.record_successful_search(SearchCriteria::term("alpha")).unwrap();
			history.record_successful_search(SearchCriteria::term("beta")).unwrap();
		}
		let mut reloaded = open(&blob);
		assert_eq!(terms(&reloaded), vec!["beta", "alpha"]);

		reloaded.clear().unwrap();
		assert!(open(&blob).is_empty());
	}

	#[test]
	fn corrupt_blob_yields_empty_history() {
		let blob = MemoryBlobStore::new();
		blob.set(HISTORY_BLOB_KEY, b"{not json").unwrap();
		assert!(open(&blob).is_empty());
	}

	#[test]
	fn round_trip_preserves_order_and_content() {
		let entries = vec![
			SearchCriteria::term("first"),
			SearchCriteria::new(
				"second",
				vec![Token::Filter(FilterSpec::new("kind", "bug"))],
				SearchOptions {
					case_sensitive: true,
					..SearchOptions::default()
				},
			),
		];
		let bytes = encode(&entries).unwrap();
		assert_eq!(decode(&bytes).unwrap(), entries);
	}

	#[test]
	fn blob_format_is_stable() {
		let entries = vec![SearchCriteria::new(
			"parser",
			vec![Token::Filter(FilterSpec::new("lang", "rust"))],
			SearchOptions::default(),
		)];
		let text = String::from_utf8(encode(&entries).unwrap()).unwrap();
		insta::assert_snapshot!(text, @r#"[{"search_term":"parser","tokens":[{"kind":"filter","field":"lang","value":"rust"}],"options":{"case_sensitive":false,"match_mode":"contains"}}]"#);
	}

	#[test]
	fn file_store_round_trips_and_reports_missing_slots() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileBlobStore::new(dir.path().join("nested"));
		assert!(store.get(HISTORY_BLOB_KEY).unwrap().is_none());

		store.set(HISTORY_BLOB_KEY, b"[]").unwrap();
		assert_eq!(store.get(HISTORY_BLOB_KEY).unwrap(), Some(b"[]".to_vec()));
		assert!(dir.path().join("nested").join("recent-searches.json").exists());
		assert!(!dir.path().join("nested").join("recent-searches.tmp").exists());
	}

	#[test]
	fn file_backed_history_survives_reopen() {
		let dir = tempfile::tempdir().unwrap();
		{
			let mut history =
				HistoryStore::open(FileBlobStore::new(dir.path()), &HistoryConfig::default());
			history.record_successful_search(SearchCriteria::term("persisted")).unwrap();
		}
		let history = HistoryStore::open(FileBlobStore::new(dir.path()), &HistoryConfig::default());
		assert_eq!(terms(&history), vec!["persisted"]);
	}
}
