use quarry_arithmetic::ValueTuple;
use quarry_source::{DocumentKey, Key};
use serde::{Deserialize, Serialize};

/// One matching posting found by an ivarator scan.
///
/// Postings order by document first, so all postings of one document are
/// adjacent in an ivarator's sorted set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldPosting {
    pub document: DocumentKey,
    pub field: String,
    pub value: String,
}

impl FieldPosting {
    pub fn new(
        document: DocumentKey,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> FieldPosting {
        FieldPosting {
            document,
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn to_tuple(&self) -> ValueTuple {
        ValueTuple::new(self.field.clone(), self.value.clone())
    }
}

/// The attribute recorded for a posting read straight from the field index.
/// Index values are already normalized.
pub(crate) fn posting_tuple(field: &str, value: &str, key: &Key) -> ValueTuple {
    ValueTuple::new(field, value).with_source(key.clone())
}
