use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one logical record inside a row: `(datatype, uid)`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentPointer {
    pub datatype: String,
    pub uid: String,
}

impl DocumentPointer {
    pub fn new(datatype: impl Into<String>, uid: impl Into<String>) -> DocumentPointer {
        DocumentPointer {
            datatype: datatype.into(),
            uid: uid.into(),
        }
    }
}

impl fmt::Display for DocumentPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.datatype, self.uid)
    }
}

/// The element produced by every nested iterator: a document pointer scoped
/// to the row (shard) it was found in.
///
/// Ordering is by row, then datatype, then uid, which is the order in which
/// field-index postings for a single value are stored.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentKey {
    pub row: String,
    pub pointer: DocumentPointer,
}

impl DocumentKey {
    pub fn new(row: impl Into<String>, pointer: DocumentPointer) -> DocumentKey {
        DocumentKey {
            row: row.into(),
            pointer,
        }
    }

    pub fn from_parts(
        row: impl Into<String>,
        datatype: impl Into<String>,
        uid: impl Into<String>,
    ) -> DocumentKey {
        DocumentKey::new(row, DocumentPointer::new(datatype, uid))
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.row, self.pointer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_key_order() {
        let mut keys = vec![
            DocumentKey::from_parts("r2", "a", "1"),
            DocumentKey::from_parts("r1", "b", "0"),
            DocumentKey::from_parts("r1", "a", "2"),
            DocumentKey::from_parts("r1", "a", "1"),
        ];
        keys.sort();
        let shown: Vec<String> = keys.iter().map(ToString::to_string).collect();
        assert_eq!(shown, vec!["r1/a/1", "r1/a/2", "r1/b/0", "r2/a/1"]);
    }
}
