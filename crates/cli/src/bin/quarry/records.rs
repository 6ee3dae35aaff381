use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use quarry_core::{MemoryStore, Record, RecordRef};

/// Read records from `path`.
///
/// Lines starting with `{` are parsed as JSON records; any other non-blank
/// line becomes a record titled with its text.
pub(crate) fn read_records(path: &Path) -> Result<Vec<Record>> {
	let contents = fs::read_to_string(path)
		.with_context(|| format!("failed to read records from {}", path.display()))?;
	parse_records(&contents).with_context(|| format!("invalid records in {}", path.display()))
}

pub(crate) fn parse_records(contents: &str) -> Result<Vec<Record>> {
	let mut records = Vec::new();
	for (index, line) in contents.lines().enumerate() {
		let line = line.trim();
		if line.is_empty() {
			continue;
		}
		let number = index + 1;
		let record = if line.starts_with('{') {
			serde_json::from_str(line).with_context(|| format!("line {number}"))?
		} else {
			Record::new(format!("line-{number}"), line)
		};
		records.push(record);
	}
	Ok(records)
}

/// Replace the contents of `store` with `records`, keeping the position of
/// records that survive.
pub(crate) fn replace_records(store: &MemoryStore, records: Vec<Record>) {
	let incoming: BTreeSet<RecordRef> = records.iter().map(|record| record.id.clone()).collect();
	for id in store.snapshot().iter() {
		if !incoming.contains(id) {
			store.remove(id);
		}
	}
	store.extend(records);
}

/// Attribute names present on any of `records`, sorted.
pub(crate) fn attribute_names(records: &[Record]) -> Vec<String> {
	records
		.iter()
		.flat_map(|record| record.attributes.keys().cloned())
		.collect::<BTreeSet<_>>()
		.into_iter()
		.collect()
}
