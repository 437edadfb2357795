use std::collections::BTreeMap;

use quarry_arithmetic::Normalizer;
use serde::{Deserialize, Serialize};

/// What the planner needs to know about the fields of a shard.
pub trait ShardMetadata: Send + Sync {
    fn normalizer(&self, field: &str) -> Normalizer;

    /// Field values have field-index postings.
    fn is_indexed(&self, field: &str) -> bool;

    /// Reversed field values are in the global reverse index.
    fn is_reverse_indexed(&self, field: &str) -> bool;

    /// The field is indexed but not stored with the document.
    fn is_index_only(&self, field: &str) -> bool;

    /// The field occurs in this shard at all.
    fn is_known(&self, field: &str) -> bool;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldInfo {
    pub normalizer: Normalizer,
    pub indexed: bool,
    pub reverse_indexed: bool,
    pub index_only: bool,
}

impl FieldInfo {
    pub fn stored(normalizer: Normalizer) -> FieldInfo {
        FieldInfo {
            normalizer,
            ..Default::default()
        }
    }

    pub fn indexed(normalizer: Normalizer) -> FieldInfo {
        FieldInfo {
            normalizer,
            indexed: true,
            ..Default::default()
        }
    }

    pub fn reverse_indexed(mut self) -> FieldInfo {
        self.reverse_indexed = true;
        self
    }

    pub fn index_only(mut self) -> FieldInfo {
        self.indexed = true;
        self.index_only = true;
        self
    }
}

/// Metadata held in memory, typically loaded from a JSON fixture.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticMetadata {
    #[serde(default)]
    fields: BTreeMap<String, FieldInfo>,
}

impl StaticMetadata {
    pub fn builder() -> StaticMetadataBuilder {
        StaticMetadataBuilder::default()
    }

    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldInfo)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl ShardMetadata for StaticMetadata {
    fn normalizer(&self, field: &str) -> Normalizer {
        self.field(field).map(|f| f.normalizer).unwrap_or_default()
    }

    fn is_indexed(&self, field: &str) -> bool {
        self.field(field).is_some_and(|f| f.indexed)
    }

    fn is_reverse_indexed(&self, field: &str) -> bool {
        self.field(field).is_some_and(|f| f.reverse_indexed)
    }

    fn is_index_only(&self, field: &str) -> bool {
        self.field(field).is_some_and(|f| f.index_only)
    }

    fn is_known(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }
}

#[derive(Default)]
pub struct StaticMetadataBuilder {
    fields: BTreeMap<String, FieldInfo>,
}

impl StaticMetadataBuilder {
    pub fn field(mut self, name: impl Into<String>, info: FieldInfo) -> Self {
        self.fields.insert(name.into(), info);
        self
    }

    pub fn build(self) -> StaticMetadata {
        StaticMetadata {
            fields: self.fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_lookups() {
        let metadata = StaticMetadata::builder()
            .field("NAME", FieldInfo::indexed(Normalizer::LowerCase).reverse_indexed())
            .field("BODY", FieldInfo::indexed(Normalizer::Verbatim).index_only())
            .field("NOTE", FieldInfo::stored(Normalizer::Verbatim))
            .build();
        assert!(metadata.is_indexed("NAME"));
        assert!(metadata.is_reverse_indexed("NAME"));
        assert!(metadata.is_index_only("BODY") && metadata.is_indexed("BODY"));
        assert!(metadata.is_known("NOTE") && !metadata.is_indexed("NOTE"));
        assert!(!metadata.is_known("MISSING"));
        assert_eq!(metadata.normalizer("NAME"), Normalizer::LowerCase);
        assert_eq!(metadata.normalizer("MISSING"), Normalizer::Verbatim);
    }

    #[test]
    fn test_from_json() {
        let metadata: StaticMetadata = serde_json::from_str(
            r#"{"fields": {"AGE": {"normalizer": "number", "indexed": true}}}"#,
        )
        .unwrap();
        assert_eq!(metadata.normalizer("AGE"), Normalizer::Number);
        assert!(metadata.is_indexed("AGE"));
        assert!(!metadata.is_reverse_indexed("AGE"));
    }
}
