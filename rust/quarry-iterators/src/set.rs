use quarry_arithmetic::Document;
use quarry_common::{Result, ScanBudget};
use quarry_sorted_set::{ExternalSortedSet, SortedSetIter};
use quarry_source::DocumentKey;

use crate::{
    iterator::{Head, NestedIterator},
    posting::FieldPosting,
};

/// Leaf over the completed external sorted set an ivarator populated.
///
/// Postings of one document are adjacent in the set and are grouped into a
/// single candidate carrying every matched value.
pub struct SortedSetIterator {
    set: ExternalSortedSet<FieldPosting>,
    cursor: Option<SortedSetIter<FieldPosting>>,
    pending: Option<FieldPosting>,
    head: Option<Head>,
    document: Document,
    description: String,
}

impl SortedSetIterator {
    pub fn new(set: ExternalSortedSet<FieldPosting>, description: impl Into<String>) -> Self {
        SortedSetIterator {
            set,
            cursor: None,
            pending: None,
            head: None,
            document: Document::new(),
            description: description.into(),
        }
    }

    pub fn set(&self) -> &ExternalSortedSet<FieldPosting> {
        &self.set
    }

    fn pull(&mut self) -> Result<Option<FieldPosting>> {
        self.cursor
            .as_mut()
            .and_then(|cursor| cursor.next())
            .transpose()
    }

    fn fill(&mut self) -> Result<()> {
        self.head = None;
        let Some(first) = self.pending.take() else {
            return Ok(());
        };
        let mut document = Document::new();
        document.put(first.to_tuple());
        loop {
            match self.pull()? {
                Some(posting) if posting.document == first.document => {
                    document.put(posting.to_tuple())
                }
                other => {
                    self.pending = other;
                    break;
                }
            }
        }
        self.head = Some(Head::new(first.document, document));
        Ok(())
    }
}

impl NestedIterator for SortedSetIterator {
    fn initialize(&mut self, budget: &ScanBudget) -> Result<()> {
        budget.check("initializing an ivarator iterator")?;
        self.cursor = Some(self.set.iter()?);
        self.pending = self.pull()?;
        self.fill()
    }

    fn has_next(&self) -> bool {
        self.head.is_some()
    }

    fn next(&mut self, budget: &ScanBudget) -> Result<Option<DocumentKey>> {
        budget.check("reading an ivarator set")?;
        let Some(head) = self.head.take() else {
            return Ok(None);
        };
        self.document = head.document;
        self.fill()?;
        Ok(Some(head.key))
    }

    fn move_to(&mut self, min: &DocumentKey, budget: &ScanBudget) -> Result<Option<DocumentKey>> {
        while self.head.is_some() && !Head::reaches(&self.head, min) {
            self.fill()?;
        }
        self.next(budget)
    }

    fn document(&self) -> &Document {
        &self.document
    }

    fn kind(&self) -> &'static str {
        "ivarator"
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quarry_sorted_set::InMemoryHandlerFactory;

    use super::*;

    #[test]
    fn test_groups_postings_per_document() {
        let factory = Arc::new(InMemoryHandlerFactory::new());
        let mut set = ExternalSortedSet::with_persist_threshold(factory, 2).unwrap();
        for (uid, value) in [("2", "rose"), ("1", "red"), ("2", "ruby"), ("3", "rust")] {
            let key = DocumentKey::from_parts("r", "t", uid);
            set.add(FieldPosting::new(key, "COLOR", value)).unwrap();
        }
        assert!(set.has_persisted_data());

        let budget = ScanBudget::unlimited();
        let mut iter = SortedSetIterator::new(set, "COLOR=~r.*");
        iter.initialize(&budget).unwrap();
        assert_eq!(
            iter.move_to(&DocumentKey::from_parts("r", "t", "2"), &budget)
                .unwrap(),
            Some(DocumentKey::from_parts("r", "t", "2"))
        );
        assert_eq!(iter.document().values("COLOR").len(), 2);
        assert_eq!(
            iter.next(&budget).unwrap(),
            Some(DocumentKey::from_parts("r", "t", "3"))
        );
        assert_eq!(iter.next(&budget).unwrap(), None);
    }
}
