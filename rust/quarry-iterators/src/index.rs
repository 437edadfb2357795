use quarry_arithmetic::Document;
use quarry_common::{Result, ScanBudget};
use quarry_source::{
    DocumentKey, FilterChain, Range, SortedSource,
    field_index::{self, FieldIndexEntry},
};

use crate::{
    DEFAULT_SEEK_THRESHOLD,
    iterator::{Head, NestedIterator},
    posting::posting_tuple,
};

/// Leaf over the postings of one `field == value` term within one row.
///
/// Postings of one value are stored in document pointer order, so the
/// stream is sorted without further work. Several versions of a posting
/// (labels, timestamps) collapse into one candidate.
pub struct IndexIterator {
    source: Box<dyn SortedSource>,
    row: String,
    field: String,
    value: String,
    range: Range,
    families: Vec<String>,
    filters: FilterChain,
    seek_threshold: usize,
    head: Option<Head>,
    document: Document,
}

impl IndexIterator {
    pub fn new(
        source: Box<dyn SortedSource>,
        row: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> IndexIterator {
        let row = row.into();
        let field = field.into();
        let value = value.into();
        IndexIterator {
            range: field_index::term_range(&row, &field, &value),
            families: vec![field_index::field_index_family(&field)],
            source,
            row,
            field,
            value,
            filters: FilterChain::new(),
            seek_threshold: DEFAULT_SEEK_THRESHOLD,
            head: None,
            document: Document::new(),
        }
    }

    pub fn with_filters(mut self, filters: FilterChain) -> IndexIterator {
        self.filters = filters;
        self
    }

    /// Number of `next` calls `move_to` tries before it seeks.
    pub fn with_seek_threshold(mut self, seek_threshold: usize) -> IndexIterator {
        self.seek_threshold = seek_threshold;
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Reads the next accepted document from the source into `head`.
    fn fill(&mut self) -> Result<()> {
        self.head = None;
        while let Some(key) = self.source.top_key() {
            if !self.filters.accept(key) {
                self.source.next()?;
                continue;
            }
            let key = key.clone();
            let entry = FieldIndexEntry::parse(&key)?;
            // The term range also covers longer values that embed a delimiter.
            if entry.value != self.value {
                self.source.next()?;
                continue;
            }
            let mut document = Document::new();
            document.put(posting_tuple(&entry.field, &entry.value, &key));
            self.source.next()?;
            while let Some(next) = self.source.top_key() {
                if field_index::parse_pointer(next).as_ref() != Some(&entry.pointer) {
                    break;
                }
                self.source.next()?;
            }
            self.head = Some(Head::new(entry.document_key(&key.row), document));
            return Ok(());
        }
        Ok(())
    }

    fn seek_to(&mut self, min: &DocumentKey) -> Result<()> {
        if min.row > self.row {
            self.head = None;
            return Ok(());
        }
        let start =
            field_index::posting_seek_key(&self.row, &self.field, &self.value, &min.pointer);
        let range = self.range.clip_start(&start);
        self.source.seek(&range, &self.families, true)?;
        self.fill()
    }
}

impl NestedIterator for IndexIterator {
    fn initialize(&mut self, budget: &ScanBudget) -> Result<()> {
        budget.check("initializing an index iterator")?;
        self.source.seek(&self.range, &self.families, true)?;
        self.fill()
    }

    fn has_next(&self) -> bool {
        self.head.is_some()
    }

    fn next(&mut self, budget: &ScanBudget) -> Result<Option<DocumentKey>> {
        budget.check("reading the field index")?;
        let Some(head) = self.head.take() else {
            return Ok(None);
        };
        self.document = head.document;
        self.fill()?;
        Ok(Some(head.key))
    }

    fn move_to(&mut self, min: &DocumentKey, budget: &ScanBudget) -> Result<Option<DocumentKey>> {
        if self.head.is_none() || Head::reaches(&self.head, min) {
            return self.next(budget);
        }
        budget.check("moving an index iterator")?;
        // Nearby targets are cheaper to reach by stepping than by seeking.
        for _ in 0..self.seek_threshold {
            self.fill()?;
            if self.head.is_none() || Head::reaches(&self.head, min) {
                return self.next(budget);
            }
        }
        self.seek_to(min)?;
        self.next(budget)
    }

    fn document(&self) -> &Document {
        &self.document
    }

    fn kind(&self) -> &'static str {
        "index"
    }

    fn describe(&self) -> String {
        format!("{}=={}", self.field, self.value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quarry_source::{DocumentPointer, Key, KeyFilter, MemorySource, field_index::field_index_key};

    use super::*;

    fn table(uids: impl IntoIterator<Item = u32>) -> MemorySource {
        let mut keys = Vec::new();
        for uid in uids {
            let pointer = DocumentPointer::new("csv", format!("{uid:05}"));
            keys.push(field_index_key("r", "COLOR", "red", &pointer));
            keys.push(field_index_key("r", "COLOR", "blue", &pointer));
            keys.push(field_index_key("r", "COLOR", "red", &pointer).with_timestamp(5));
        }
        MemorySource::from_keys(keys)
    }

    fn key(uid: u32) -> DocumentKey {
        DocumentKey::from_parts("r", "csv", format!("{uid:05}"))
    }

    fn drain(iter: &mut IndexIterator) -> Vec<DocumentKey> {
        let budget = ScanBudget::unlimited();
        let mut out = Vec::new();
        while let Some(k) = iter.next(&budget).unwrap() {
            out.push(k);
        }
        out
    }

    #[test]
    fn test_versions_collapse() {
        let source = table([1, 2, 3]);
        let mut iter = IndexIterator::new(Box::new(source), "r", "COLOR", "red");
        iter.initialize(&ScanBudget::unlimited()).unwrap();
        assert!(iter.has_next());
        assert_eq!(drain(&mut iter), vec![key(1), key(2), key(3)]);
        assert!(!iter.has_next());
    }

    #[test]
    fn test_document_carries_posting() {
        let source = table([7]);
        let mut iter = IndexIterator::new(Box::new(source), "r", "COLOR", "blue");
        let budget = ScanBudget::unlimited();
        iter.initialize(&budget).unwrap();
        assert_eq!(iter.next(&budget).unwrap(), Some(key(7)));
        let values = iter.document().values("COLOR");
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].raw, "blue");
        assert!(values[0].source.is_some());
    }

    #[test]
    fn test_move_to_seeks_past_threshold() {
        let source = table(0..200);
        let stats = source.stats().clone();
        let mut iter =
            IndexIterator::new(Box::new(source), "r", "COLOR", "red").with_seek_threshold(3);
        let budget = ScanBudget::unlimited();
        iter.initialize(&budget).unwrap();
        assert_eq!(stats.seeks(), 1);

        // Close target: reached by stepping.
        assert_eq!(iter.move_to(&key(2), &budget).unwrap(), Some(key(2)));
        assert_eq!(stats.seeks(), 1);

        // Far target: seeks.
        assert_eq!(iter.move_to(&key(150), &budget).unwrap(), Some(key(150)));
        assert_eq!(stats.seeks(), 2);
        assert_eq!(iter.next(&budget).unwrap(), Some(key(151)));

        assert_eq!(
            iter.move_to(&DocumentKey::from_parts("s", "csv", "0"), &budget)
                .unwrap(),
            None
        );
    }

    struct DropUid(&'static str);

    impl KeyFilter for DropUid {
        fn name(&self) -> &str {
            "drop-uid"
        }

        fn accept(&self, key: &Key) -> bool {
            !key.qualifier.ends_with(self.0)
        }
    }

    #[test]
    fn test_filters_skip_postings() {
        let source = table([1, 2, 3]);
        let filters = FilterChain::new().with(Arc::new(DropUid("00002")));
        let mut iter =
            IndexIterator::new(Box::new(source), "r", "COLOR", "red").with_filters(filters);
        iter.initialize(&ScanBudget::unlimited()).unwrap();
        assert_eq!(drain(&mut iter), vec![key(1), key(3)]);
    }

    #[test]
    fn test_values_with_embedded_delimiter_are_skipped() {
        let p = |uid: &str| DocumentPointer::new("csv", uid);
        let source = MemorySource::from_keys([
            field_index_key("r", "NAME", "a", &p("1")),
            field_index_key("r", "NAME", "a\0b", &p("2")),
            field_index_key("r", "NAME", "a\0zz", &p("0")),
            field_index_key("r", "NAME", "a", &p("3")),
        ]);
        let mut iter = IndexIterator::new(Box::new(source), "r", "NAME", "a");
        iter.initialize(&ScanBudget::unlimited()).unwrap();
        let uids: Vec<String> = drain(&mut iter).into_iter().map(|k| k.pointer.uid).collect();
        assert_eq!(uids, vec!["1", "3"]);
    }
}
