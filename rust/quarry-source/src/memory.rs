use std::{
    collections::{BTreeMap, BTreeSet},
    ops::Bound,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use quarry_common::{Result, error::Error};

use crate::{
    key::{Key, PartialKey},
    range::Range,
    source::SortedSource,
};

/// Seek and next counters shared by a source and all of its deep copies.
#[derive(Debug, Default)]
pub struct SourceStats {
    seeks: AtomicU64,
    nexts: AtomicU64,
}

impl SourceStats {
    pub fn seeks(&self) -> u64 {
        self.seeks.load(Ordering::Relaxed)
    }

    pub fn nexts(&self) -> u64 {
        self.nexts.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.seeks.store(0, Ordering::Relaxed);
        self.nexts.store(0, Ordering::Relaxed);
    }
}

/// A [`SortedSource`] over an immutable in-memory table.
///
/// Deep copies share the table and the [`SourceStats`], so tests can observe
/// how many seeks and nexts a whole iterator tree performed.
#[derive(Clone)]
pub struct MemorySource {
    data: Arc<BTreeMap<Key, Vec<u8>>>,
    stats: Arc<SourceStats>,
    range: Range,
    families: BTreeSet<String>,
    inclusive: bool,
    top: Option<Key>,
}

impl MemorySource {
    pub fn new(data: BTreeMap<Key, Vec<u8>>) -> MemorySource {
        MemorySource {
            data: Arc::new(data),
            stats: Default::default(),
            range: Range::all(),
            families: BTreeSet::new(),
            inclusive: false,
            top: None,
        }
    }

    /// Builds a table whose cells all carry an empty value.
    pub fn from_keys(keys: impl IntoIterator<Item = Key>) -> MemorySource {
        MemorySource::new(keys.into_iter().map(|k| (k, Vec::new())).collect())
    }

    pub fn stats(&self) -> &Arc<SourceStats> {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn family_passes(&self, family: &str) -> bool {
        self.families.contains(family) == self.inclusive
    }

    fn position(&mut self, mut lower: Bound<Key>) {
        self.top = None;
        loop {
            let Some(candidate) = self
                .data
                .range((lower.as_ref(), Bound::Unbounded))
                .next()
                .map(|(k, _)| k)
            else {
                return;
            };
            if self.range.after_end(candidate) {
                return;
            }
            if !self.family_passes(&candidate.family) {
                lower = Bound::Included(candidate.following_key(PartialKey::RowFamily));
                continue;
            }
            self.top = Some(candidate.clone());
            return;
        }
    }
}

impl SortedSource for MemorySource {
    fn seek(&mut self, range: &Range, families: &[String], inclusive: bool) -> Result<()> {
        self.stats.seeks.fetch_add(1, Ordering::Relaxed);
        self.range = range.clone();
        self.families = families.iter().cloned().collect();
        self.inclusive = inclusive;
        let lower = match range.start() {
            None => Bound::Unbounded,
            Some(start) if range.is_start_inclusive() => Bound::Included(start.clone()),
            Some(start) => Bound::Excluded(start.clone()),
        };
        self.position(lower);
        Ok(())
    }

    fn has_top(&self) -> bool {
        self.top.is_some()
    }

    fn top_key(&self) -> Option<&Key> {
        self.top.as_ref()
    }

    fn top_value(&self) -> Option<&[u8]> {
        self.top
            .as_ref()
            .and_then(|k| self.data.get(k))
            .map(Vec::as_slice)
    }

    fn next(&mut self) -> Result<()> {
        let top = self
            .top
            .take()
            .ok_or_else(|| Error::invalid_operation("next on exhausted source"))?;
        self.stats.nexts.fetch_add(1, Ordering::Relaxed);
        self.position(Bound::Excluded(top));
        Ok(())
    }

    fn deep_copy(&self) -> Box<dyn SortedSource> {
        Box::new(MemorySource {
            data: self.data.clone(),
            stats: self.stats.clone(),
            range: Range::all(),
            families: BTreeSet::new(),
            inclusive: false,
            top: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> MemorySource {
        MemorySource::from_keys([
            Key::new("r1", "a", "1"),
            Key::new("r1", "a", "2"),
            Key::new("r1", "b", "1"),
            Key::new("r1", "c", "1"),
            Key::new("r2", "a", "1"),
        ])
    }

    fn drain(source: &mut dyn SortedSource) -> Vec<Key> {
        let mut out = Vec::new();
        while let Some(k) = source.top_key() {
            out.push(k.clone());
            source.next().unwrap();
        }
        out
    }

    #[test]
    fn test_seek_row() {
        let mut source = table();
        source.seek(&Range::exact_row("r1"), &[], false).unwrap();
        assert_eq!(drain(&mut source).len(), 4);
        assert!(!source.has_top());
        assert!(source.next().is_err());
    }

    #[test]
    fn test_family_filters() {
        let mut source = table();
        source
            .seek(&Range::all(), &["b".to_string()], true)
            .unwrap();
        assert_eq!(drain(&mut source), vec![Key::new("r1", "b", "1")]);

        source
            .seek(&Range::exact_row("r1"), &["a".to_string()], false)
            .unwrap();
        let families: Vec<String> = drain(&mut source).into_iter().map(|k| k.family).collect();
        assert_eq!(families, vec!["b", "c"]);

        source.seek(&Range::all(), &[], true).unwrap();
        assert!(!source.has_top());
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let mut source = table();
        source.seek(&Range::all(), &[], false).unwrap();
        source.next().unwrap();
        let mut copy = source.deep_copy();
        assert!(!copy.has_top());
        copy.seek(&Range::exact_row("r2"), &[], false).unwrap();
        assert_eq!(copy.top_key().unwrap().row, "r2");
        assert_eq!(source.top_key().unwrap(), &Key::new("r1", "a", "2"));
        assert_eq!(source.stats().seeks(), 2);
        assert_eq!(source.stats().nexts(), 1);
        assert_eq!(copy.top_value(), Some(&[][..]));
    }
}
