use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};

use crate::NULL_DELIMITER;

/// A composite store key: `(row, family, qualifier, label, timestamp)`.
///
/// Keys order lexicographically by row, family, qualifier and label, then by
/// timestamp *descending*, so the newest version of a cell sorts first.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    pub row: String,
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub qualifier: String,
    /// Opaque security label guarding this cell. Empty means public.
    #[serde(default)]
    pub label: String,
    #[serde(default = "Key::latest_timestamp")]
    pub timestamp: i64,
}

/// Which leading components of a [`Key`] take part in a prefix comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialKey {
    Row,
    RowFamily,
    RowFamilyQualifier,
    RowFamilyQualifierLabel,
    Full,
}

impl Key {
    /// Creates a key with an empty label and the latest possible timestamp,
    /// i.e. the first key of its `(row, family, qualifier)` cell.
    pub fn new(
        row: impl Into<String>,
        family: impl Into<String>,
        qualifier: impl Into<String>,
    ) -> Key {
        Key {
            row: row.into(),
            family: family.into(),
            qualifier: qualifier.into(),
            label: String::new(),
            timestamp: i64::MAX,
        }
    }

    /// The first key of `row`.
    pub fn row_start(row: impl Into<String>) -> Key {
        Key::new(row, "", "")
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Key {
        self.label = label.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Key {
        self.timestamp = timestamp;
        self
    }

    fn latest_timestamp() -> i64 {
        i64::MAX
    }

    /// Returns the smallest key strictly greater than every key that shares
    /// this key's `part` prefix.
    pub fn following_key(&self, part: PartialKey) -> Key {
        fn bump(s: &str) -> String {
            let mut next = String::with_capacity(s.len() + 1);
            next.push_str(s);
            next.push(NULL_DELIMITER);
            next
        }

        match part {
            PartialKey::Row => Key::new(bump(&self.row), "", ""),
            PartialKey::RowFamily => Key::new(self.row.clone(), bump(&self.family), ""),
            PartialKey::RowFamilyQualifier => Key::new(
                self.row.clone(),
                self.family.clone(),
                bump(&self.qualifier),
            ),
            PartialKey::RowFamilyQualifierLabel => Key::new(
                self.row.clone(),
                self.family.clone(),
                self.qualifier.clone(),
            )
            .with_label(bump(&self.label)),
            PartialKey::Full => {
                if self.timestamp == i64::MIN {
                    self.following_key(PartialKey::RowFamilyQualifierLabel)
                } else {
                    self.clone().with_timestamp(self.timestamp - 1)
                }
            }
        }
    }

    /// Compares the `part` prefix of two keys for equality.
    pub fn equals_prefix(&self, other: &Key, part: PartialKey) -> bool {
        match part {
            PartialKey::Row => self.row == other.row,
            PartialKey::RowFamily => self.row == other.row && self.family == other.family,
            PartialKey::RowFamilyQualifier => {
                self.row == other.row
                    && self.family == other.family
                    && self.qualifier == other.qualifier
            }
            PartialKey::RowFamilyQualifierLabel => {
                self.equals_prefix(other, PartialKey::RowFamilyQualifier)
                    && self.label == other.label
            }
            PartialKey::Full => self == other,
        }
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.row
            .cmp(&other.row)
            .then_with(|| self.family.cmp(&other.family))
            .then_with(|| self.qualifier.cmp(&other.qualifier))
            .then_with(|| self.label.cmp(&other.label))
            .then_with(|| other.timestamp.cmp(&self.timestamp))
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{} [{}] {}",
            self.row.escape_debug(),
            self.family.escape_debug(),
            self.qualifier.escape_debug(),
            self.label,
            self.timestamp
        )
    }
}
