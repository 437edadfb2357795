//! Iterators for callers that do not need document keys in order.
//!
//! With unsorted document ids a range or pattern leaf can stream postings in
//! index (value) order instead of materializing them, at the price of giving
//! up `move_to` and therefore intersection.

use std::sync::Arc;

use ahash::HashSet;
use quarry_arithmetic::Document;
use quarry_common::{Result, ScanBudget, error::Error};
use quarry_source::{
    DocumentKey, FilterChain, Range, SortedSource,
    field_index::{self, FieldIndexEntry},
};

use crate::{
    iterator::{Head, NestedIterator},
    posting::posting_tuple,
};

/// Accepts or rejects a posting value.
pub type ValueMatcher = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Streams every posting of a field whose value falls in a range and passes
/// an optional matcher, one candidate per document.
pub struct UnsortedIterator {
    source: Box<dyn SortedSource>,
    range: Range,
    families: Vec<String>,
    matcher: Option<ValueMatcher>,
    filters: FilterChain,
    seen: HashSet<DocumentKey>,
    head: Option<Head>,
    document: Document,
    description: String,
}

impl UnsortedIterator {
    /// # Arguments
    ///
    /// * `source` - Cursor over the shard table.
    /// * `field` - Field whose postings are scanned.
    /// * `range` - Field-index scan range within one row.
    pub fn new(source: Box<dyn SortedSource>, field: &str, range: Range) -> UnsortedIterator {
        UnsortedIterator {
            source,
            range,
            families: vec![field_index::field_index_family(field)],
            matcher: None,
            filters: FilterChain::new(),
            seen: HashSet::default(),
            head: None,
            document: Document::new(),
            description: format!("unsorted {field}"),
        }
    }

    pub fn with_matcher(mut self, matcher: ValueMatcher) -> UnsortedIterator {
        self.matcher = Some(matcher);
        self
    }

    pub fn with_filters(mut self, filters: FilterChain) -> UnsortedIterator {
        self.filters = filters;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> UnsortedIterator {
        self.description = description.into();
        self
    }

    fn fill(&mut self) -> Result<()> {
        self.head = None;
        while let Some(key) = self.source.top_key() {
            let key = key.clone();
            self.source.next()?;
            if !self.filters.accept(&key) {
                continue;
            }
            let entry = FieldIndexEntry::parse(&key)?;
            if self.matcher.as_ref().is_some_and(|m| !m(&entry.value)) {
                continue;
            }
            let doc_key = entry.document_key(&key.row);
            if !self.seen.insert(doc_key.clone()) {
                continue;
            }
            let mut document = Document::new();
            document.put(posting_tuple(&entry.field, &entry.value, &key));
            self.head = Some(Head::new(doc_key, document));
            return Ok(());
        }
        Ok(())
    }
}

impl NestedIterator for UnsortedIterator {
    fn initialize(&mut self, budget: &ScanBudget) -> Result<()> {
        budget.check("initializing an unsorted iterator")?;
        self.source.seek(&self.range, &self.families, true)?;
        self.fill()
    }

    fn has_next(&self) -> bool {
        self.head.is_some()
    }

    fn next(&mut self, budget: &ScanBudget) -> Result<Option<DocumentKey>> {
        budget.check("streaming unsorted postings")?;
        let Some(head) = self.head.take() else {
            return Ok(None);
        };
        self.document = head.document;
        self.fill()?;
        Ok(Some(head.key))
    }

    fn move_to(&mut self, _min: &DocumentKey, _budget: &ScanBudget) -> Result<Option<DocumentKey>> {
        Err(Error::invalid_operation("move_to on an unsorted iterator"))
    }

    fn document(&self) -> &Document {
        &self.document
    }

    fn kind(&self) -> &'static str {
        "unsorted"
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// Chains unsorted children, dropping keys already returned.
pub struct UnsortedOrIterator {
    children: Vec<Box<dyn NestedIterator>>,
    current: usize,
    seen: HashSet<DocumentKey>,
    head: Option<Head>,
    document: Document,
}

impl UnsortedOrIterator {
    pub fn new(children: Vec<Box<dyn NestedIterator>>) -> UnsortedOrIterator {
        UnsortedOrIterator {
            children,
            current: 0,
            seen: HashSet::default(),
            head: None,
            document: Document::new(),
        }
    }

    fn fill(&mut self, budget: &ScanBudget) -> Result<()> {
        self.head = None;
        while let Some(child) = self.children.get_mut(self.current) {
            match child.next(budget)? {
                Some(key) if self.seen.insert(key.clone()) => {
                    self.head = Some(Head::new(key, child.document().clone()));
                    return Ok(());
                }
                Some(_) => {}
                None => self.current += 1,
            }
        }
        Ok(())
    }
}

impl NestedIterator for UnsortedOrIterator {
    fn initialize(&mut self, budget: &ScanBudget) -> Result<()> {
        for child in &mut self.children {
            child.initialize(budget)?;
        }
        self.fill(budget)
    }

    fn has_next(&self) -> bool {
        self.head.is_some()
    }

    fn next(&mut self, budget: &ScanBudget) -> Result<Option<DocumentKey>> {
        let Some(head) = self.head.take() else {
            return Ok(None);
        };
        self.document = head.document;
        self.fill(budget)?;
        Ok(Some(head.key))
    }

    fn move_to(&mut self, _min: &DocumentKey, _budget: &ScanBudget) -> Result<Option<DocumentKey>> {
        Err(Error::invalid_operation("move_to on an unsorted union"))
    }

    fn children(&self) -> Vec<&dyn NestedIterator> {
        self.children.iter().map(|c| c.as_ref()).collect()
    }

    fn document(&self) -> &Document {
        &self.document
    }

    fn kind(&self) -> &'static str {
        "unsorted-or"
    }

    fn describe(&self) -> String {
        "OR*".to_string()
    }
}
