//! Builders writing documents into in-memory shard tables and global indexes,
//! using the same key layouts and normalization as ingest.

use quarry_planner::{ShardMetadata, StaticMetadata};
use quarry_source::{
    DocumentPointer, Key, MemorySource, NULL_DELIMITER,
    field_index::{event_key, field_index_key},
};

use crate::fixture::DocumentFixture;

/// Writes stored attributes and field-index postings for one row.
///
/// Stored attributes keep their raw value; postings carry the normalized
/// value. Index-only fields get postings but no stored attribute, and fields
/// that are not indexed get no postings.
pub struct ShardTableBuilder {
    row: String,
    metadata: StaticMetadata,
    keys: Vec<Key>,
}

impl ShardTableBuilder {
    pub fn new(row: impl Into<String>, metadata: StaticMetadata) -> ShardTableBuilder {
        ShardTableBuilder {
            row: row.into(),
            metadata,
            keys: Vec::new(),
        }
    }

    pub fn add(&mut self, document: &DocumentFixture) -> &mut Self {
        let pointer = DocumentPointer::new(document.datatype.clone(), document.uid.clone());
        for (field, values) in &document.fields {
            let normalizer = self.metadata.normalizer(field);
            for raw in values {
                if !self.metadata.is_index_only(field) {
                    let key = event_key(&self.row, &pointer, field, raw);
                    self.keys.push(stamp(key, document, field));
                }
                if self.metadata.is_indexed(field) {
                    let normalized = normalizer.normalize(raw).unwrap_or_else(|_| raw.clone());
                    let key = field_index_key(&self.row, field, &normalized, &pointer);
                    self.keys.push(stamp(key, document, field));
                }
            }
        }
        self
    }

    /// Adds a raw key, e.g. one the builder would never produce.
    pub fn add_key(&mut self, key: Key) -> &mut Self {
        self.keys.push(key);
        self
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn build(self) -> MemorySource {
        MemorySource::from_keys(self.keys)
    }
}

fn stamp(key: Key, document: &DocumentFixture, field: &str) -> Key {
    let key = key.with_label(document.label_of(field));
    match document.timestamp {
        Some(timestamp) => key.with_timestamp(timestamp),
        None => key,
    }
}

/// Writes global term index entries: `row = value`, `family = field`,
/// `qualifier = shard\0datatype`, with the value reversed in the reverse
/// index.
pub struct GlobalIndexBuilder {
    metadata: StaticMetadata,
    forward: Vec<Key>,
    reverse: Vec<Key>,
}

impl GlobalIndexBuilder {
    pub fn new(metadata: StaticMetadata) -> GlobalIndexBuilder {
        GlobalIndexBuilder {
            metadata,
            forward: Vec::new(),
            reverse: Vec::new(),
        }
    }

    /// Indexes every indexed field of `document`, found in shard `row`.
    pub fn add(&mut self, row: &str, document: &DocumentFixture) -> &mut Self {
        for (field, values) in &document.fields {
            if !self.metadata.is_indexed(field) {
                continue;
            }
            let normalizer = self.metadata.normalizer(field);
            for raw in values {
                let value = normalizer.normalize(raw).unwrap_or_else(|_| raw.clone());
                self.add_term(field, &value, row, &document.datatype);
            }
        }
        self
    }

    /// Adds one already normalized term.
    pub fn add_term(&mut self, field: &str, value: &str, row: &str, datatype: &str) -> &mut Self {
        let qualifier = format!("{row}{NULL_DELIMITER}{datatype}");
        self.forward.push(Key::new(value, field, qualifier.clone()));
        if self.metadata.is_reverse_indexed(field) {
            let reversed: String = value.chars().rev().collect();
            self.reverse.push(Key::new(reversed, field, qualifier));
        }
        self
    }

    /// Returns the forward and reverse index.
    pub fn build(self) -> (MemorySource, MemorySource) {
        (
            MemorySource::from_keys(self.forward),
            MemorySource::from_keys(self.reverse),
        )
    }
}
