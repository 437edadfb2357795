use quarry_arithmetic::Document;
use quarry_common::{Result, ScanBudget};
use quarry_source::{
    DocumentKey, FilterChain, Key, PartialKey, Range, SortedSource,
    field_index::{self, is_field_index_family},
};

use crate::iterator::NestedIterator;

/// Enumerates every stored document of one row, skipping the field index.
///
/// Used when nothing in a query can be answered from the index; each
/// candidate is then checked against the full expression. Candidates carry
/// no attributes.
pub struct DocumentScanIterator {
    source: Box<dyn SortedSource>,
    row: String,
    range: Range,
    filters: FilterChain,
    head: Option<DocumentKey>,
    document: Document,
}

impl DocumentScanIterator {
    pub fn new(source: Box<dyn SortedSource>, row: impl Into<String>) -> DocumentScanIterator {
        let row = row.into();
        DocumentScanIterator {
            range: Range::exact_row(&row),
            source,
            row,
            filters: FilterChain::new(),
            head: None,
            document: Document::new(),
        }
    }

    pub fn with_filters(mut self, filters: FilterChain) -> DocumentScanIterator {
        self.filters = filters;
        self
    }

    fn seek(&mut self, start: Option<Key>) -> Result<()> {
        let range = match start {
            Some(start) => self.range.clip_start(&start),
            None => self.range.clone(),
        };
        self.source.seek(&range, &[], false)
    }

    /// Positions `head` on the next document, leaving the source on the
    /// first key past it.
    fn fill(&mut self) -> Result<()> {
        self.head = None;
        while let Some(key) = self.source.top_key() {
            let skip_to = key.following_key(PartialKey::RowFamily);
            if is_field_index_family(&key.family) {
                self.seek(Some(skip_to))?;
                continue;
            }
            // A hidden attribute does not hide the rest of its document.
            if !self.filters.accept(key) {
                self.source.next()?;
                continue;
            }
            let pointer = field_index::parse_pointer(key);
            self.seek(Some(skip_to))?;
            if let Some(pointer) = pointer {
                self.head = Some(DocumentKey::new(self.row.clone(), pointer));
                return Ok(());
            }
        }
        Ok(())
    }
}

impl NestedIterator for DocumentScanIterator {
    fn initialize(&mut self, budget: &ScanBudget) -> Result<()> {
        budget.check("initializing a document scan")?;
        self.seek(None)?;
        self.fill()
    }

    fn has_next(&self) -> bool {
        self.head.is_some()
    }

    fn next(&mut self, budget: &ScanBudget) -> Result<Option<DocumentKey>> {
        budget.check("scanning documents")?;
        let Some(head) = self.head.take() else {
            return Ok(None);
        };
        self.fill()?;
        Ok(Some(head))
    }

    fn move_to(&mut self, min: &DocumentKey, budget: &ScanBudget) -> Result<Option<DocumentKey>> {
        if self.head.as_ref().is_some_and(|h| h < min) {
            if min.row > self.row {
                self.head = None;
            } else {
                let start = Key::new(
                    self.row.as_str(),
                    field_index::event_family(&min.pointer),
                    "",
                );
                self.seek(Some(start))?;
                self.fill()?;
            }
        }
        self.next(budget)
    }

    fn document(&self) -> &Document {
        &self.document
    }

    fn kind(&self) -> &'static str {
        "scan"
    }

    fn describe(&self) -> String {
        format!("scan {}", self.row)
    }
}
