use std::collections::BTreeMap;

use quarry_arithmetic::Document;
use quarry_common::{Result, ScanBudget};
use quarry_source::DocumentKey;

use crate::iterator::NestedIterator;

/// Leaf over an in-memory sorted map of candidates, typically the result of
/// a range scan that stayed under the expansion threshold.
pub struct SortedListIterator {
    entries: BTreeMap<DocumentKey, Document>,
    document: Document,
    description: String,
}

impl SortedListIterator {
    pub fn new(entries: BTreeMap<DocumentKey, Document>) -> SortedListIterator {
        SortedListIterator {
            entries,
            document: Document::new(),
            description: "list".to_string(),
        }
    }

    /// A list whose candidates carry no attributes.
    pub fn from_keys(keys: impl IntoIterator<Item = DocumentKey>) -> SortedListIterator {
        SortedListIterator::new(keys.into_iter().map(|k| (k, Document::new())).collect())
    }

    pub fn with_description(mut self, description: impl Into<String>) -> SortedListIterator {
        self.description = description.into();
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl NestedIterator for SortedListIterator {
    fn initialize(&mut self, budget: &ScanBudget) -> Result<()> {
        budget.check("initializing a list iterator")
    }

    fn has_next(&self) -> bool {
        !self.entries.is_empty()
    }

    fn next(&mut self, budget: &ScanBudget) -> Result<Option<DocumentKey>> {
        budget.check("reading a candidate list")?;
        Ok(self.entries.pop_first().map(|(key, document)| {
            self.document = document;
            key
        }))
    }

    fn move_to(&mut self, min: &DocumentKey, budget: &ScanBudget) -> Result<Option<DocumentKey>> {
        if self.entries.first_key_value().is_some_and(|(k, _)| k < min) {
            self.entries = self.entries.split_off(min);
        }
        self.next(budget)
    }

    fn document(&self) -> &Document {
        &self.document
    }

    fn kind(&self) -> &'static str {
        "list"
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_to() {
        let keys: Vec<DocumentKey> = (0..10)
            .map(|i| DocumentKey::from_parts("r", "t", i.to_string()))
            .collect();
        let mut iter = SortedListIterator::from_keys(keys.clone());
        let budget = ScanBudget::unlimited();
        iter.initialize(&budget).unwrap();
        assert_eq!(iter.move_to(&keys[4], &budget).unwrap(), Some(keys[4].clone()));
        assert_eq!(iter.move_to(&keys[2], &budget).unwrap(), Some(keys[5].clone()));
        assert_eq!(iter.len(), 4);
        let past = DocumentKey::from_parts("s", "t", "0");
        assert_eq!(iter.move_to(&past, &budget).unwrap(), None);
        assert!(!iter.has_next());
    }
}
