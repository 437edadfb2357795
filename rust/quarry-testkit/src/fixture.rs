//! JSON shard fixtures.
//!
//! A fixture names a row, the field metadata of the shard and the documents
//! stored in it:
//!
//! ```json
//! {
//!   "row": "20240101_0",
//!   "metadata": { "fields": { "COLOR": { "normalizer": "lower_case", "indexed": true } } },
//!   "documents": [
//!     { "datatype": "csv", "uid": "d1", "fields": { "COLOR": ["Red", "Blue"] } }
//!   ]
//! }
//! ```

use std::{collections::BTreeMap, path::Path};

use quarry_planner::StaticMetadata;
use quarry_source::{DocumentKey, MemorySource};
use serde::{Deserialize, Serialize};

use crate::table::{GlobalIndexBuilder, ShardTableBuilder};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShardFixture {
    pub row: String,
    #[serde(default)]
    pub metadata: StaticMetadata,
    #[serde(default)]
    pub documents: Vec<DocumentFixture>,
}

impl ShardFixture {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<ShardFixture> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> anyhow::Result<ShardFixture> {
        Ok(serde_json::from_str(json)?)
    }

    /// The shard table holding every document of the fixture.
    pub fn table(&self) -> MemorySource {
        let mut builder = ShardTableBuilder::new(&self.row, self.metadata.clone());
        for document in &self.documents {
            builder.add(document);
        }
        builder.build()
    }

    /// Global forward and reverse indexes over the fixture's documents.
    pub fn global_index(&self) -> (MemorySource, MemorySource) {
        let mut builder = GlobalIndexBuilder::new(self.metadata.clone());
        for document in &self.documents {
            builder.add(&self.row, document);
        }
        builder.build()
    }

    pub fn document_key(&self, uid: &str) -> Option<DocumentKey> {
        self.documents
            .iter()
            .find(|d| d.uid == uid)
            .map(|d| DocumentKey::from_parts(self.row.clone(), d.datatype.clone(), d.uid.clone()))
    }
}

/// One stored document: raw field values, keyed by field name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentFixture {
    pub datatype: String,
    pub uid: String,
    /// Security label applied to every key of the document.
    #[serde(default)]
    pub label: String,
    /// Per-field labels, replacing `label` on the keys of that field.
    #[serde(default)]
    pub field_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub fields: BTreeMap<String, Vec<String>>,
}

impl DocumentFixture {
    pub fn new(datatype: impl Into<String>, uid: impl Into<String>) -> DocumentFixture {
        DocumentFixture {
            datatype: datatype.into(),
            uid: uid.into(),
            ..Default::default()
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> DocumentFixture {
        self.fields.entry(name.into()).or_default().push(value.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> DocumentFixture {
        self.label = label.into();
        self
    }

    /// Labels every key written for `field`.
    pub fn field_label(
        mut self,
        field: impl Into<String>,
        label: impl Into<String>,
    ) -> DocumentFixture {
        self.field_labels.insert(field.into(), label.into());
        self
    }

    /// The label of the keys written for `field`.
    pub fn label_of(&self, field: &str) -> &str {
        self.field_labels.get(field).unwrap_or(&self.label)
    }

    pub fn timestamp(mut self, timestamp: i64) -> DocumentFixture {
        self.timestamp = Some(timestamp);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let fixture = ShardFixture::from_json(
            r#"{
                "row": "20240101_0",
                "metadata": {"fields": {"COLOR": {"normalizer": "lower_case", "indexed": true}}},
                "documents": [
                    {"datatype": "csv", "uid": "d1", "fields": {"COLOR": ["Red", "Blue"]}},
                    {"datatype": "csv", "uid": "d2", "label": "A", "fields": {"COLOR": ["red"]}}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(fixture.documents.len(), 2);
        assert_eq!(fixture.documents[1].label, "A");
        assert_eq!(fixture.documents[1].label_of("COLOR"), "A");
        // Three stored values and three postings.
        let table = fixture.table();
        assert_eq!(table.len(), 6);
        let (forward, reverse) = fixture.global_index();
        assert_eq!(forward.len(), 2);
        assert!(reverse.is_empty());
        assert_eq!(
            fixture.document_key("d2"),
            Some(DocumentKey::from_parts("20240101_0", "csv", "d2"))
        );
    }

    #[test]
    fn test_field_labels() {
        let document = DocumentFixture::new("csv", "d1")
            .label("PUBLIC")
            .field_label("SSN", "SECRET")
            .field("SSN", "123")
            .field("NAME", "bob");
        assert_eq!(document.label_of("SSN"), "SECRET");
        assert_eq!(document.label_of("NAME"), "PUBLIC");
    }
}
