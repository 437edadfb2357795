use std::{
    cmp::Reverse,
    collections::{BTreeSet, BinaryHeap},
    fmt,
    sync::Arc,
};

use quarry_common::{Result, error::Error, verify_arg};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    DEFAULT_PERSIST_THRESHOLD,
    codec::{PartitionReader, write_partition},
    handler::{SortedSetFileHandler, SortedSetFileHandlerFactory},
};

/// A sorted set whose contents live partly in memory and partly in
/// externally persisted partitions.
///
/// Logically this is one duplicate-free sorted collection. Physically it is a
/// buffer plus zero or more partitions, each internally sorted; readers merge
/// them and drop duplicates. A partition is never appended to. Removals load
/// the affected partition, filter it and write the survivors to a new file.
///
/// The set exclusively owns its partition files and deletes them on
/// [`clear`](Self::clear) and on drop.
pub struct ExternalSortedSet<E> {
    factory: Arc<dyn SortedSetFileHandlerFactory>,
    persist_threshold: usize,
    buffer: BTreeSet<E>,
    partitions: Vec<Partition<E>>,
    size: usize,
    size_modified: bool,
}

struct Partition<E> {
    handler: Box<dyn SortedSetFileHandler>,
    len: usize,
    first: E,
    last: E,
}

impl<E> Partition<E>
where
    E: Ord,
{
    fn spans(&self, element: &E) -> bool {
        &self.first <= element && element <= &self.last
    }
}

impl<E> ExternalSortedSet<E>
where
    E: Ord + Clone + Serialize + DeserializeOwned,
{
    /// Creates an empty set persisting every [`DEFAULT_PERSIST_THRESHOLD`]
    /// buffered elements.
    pub fn new(factory: Arc<dyn SortedSetFileHandlerFactory>) -> ExternalSortedSet<E> {
        ExternalSortedSet {
            factory,
            persist_threshold: DEFAULT_PERSIST_THRESHOLD,
            buffer: BTreeSet::new(),
            partitions: Vec::new(),
            size: 0,
            size_modified: false,
        }
    }

    /// Creates an empty set that writes a partition whenever the buffer
    /// reaches `persist_threshold` elements.
    pub fn with_persist_threshold(
        factory: Arc<dyn SortedSetFileHandlerFactory>,
        persist_threshold: usize,
    ) -> Result<ExternalSortedSet<E>> {
        verify_arg!(persist_threshold, persist_threshold > 0);
        let mut set = Self::new(factory);
        set.persist_threshold = persist_threshold;
        Ok(set)
    }

    pub fn persist_threshold(&self) -> usize {
        self.persist_threshold
    }

    /// Inserts `element`.
    ///
    /// Returns `false` if the element was already buffered. An element that
    /// only exists in a persisted partition is buffered again and collapses
    /// with its twin on read, so the return value is `true` in that case.
    pub fn add(&mut self, element: E) -> Result<bool> {
        if !self.buffer.insert(element) {
            return Ok(false);
        }
        if self.partitions.is_empty() {
            self.size += 1;
        } else {
            self.size_modified = true;
        }
        if self.buffer.len() >= self.persist_threshold {
            self.persist()?;
        }
        Ok(true)
    }

    /// Inserts every element, returning whether any was new to the buffer.
    pub fn add_all(&mut self, elements: impl IntoIterator<Item = E>) -> Result<bool> {
        let mut changed = false;
        for element in elements {
            changed |= self.add(element)?;
        }
        Ok(changed)
    }

    pub fn contains(&self, element: &E) -> Result<bool> {
        if self.buffer.contains(element) {
            return Ok(true);
        }
        for partition in self.partitions.iter().filter(|p| p.spans(element)) {
            for stored in PartitionReader::<E>::open(partition.handler.as_ref())? {
                match stored?.cmp(element) {
                    std::cmp::Ordering::Less => continue,
                    std::cmp::Ordering::Equal => return Ok(true),
                    std::cmp::Ordering::Greater => break,
                }
            }
        }
        Ok(false)
    }

    /// Removes `element` from the buffer and from every partition holding it.
    pub fn remove(&mut self, element: &E) -> Result<bool> {
        let mut changed = self.buffer.remove(element);
        changed |= self.rewrite_partitions(|p| p.spans(element), |e| e != element)?;
        if changed {
            self.size_modified = true;
        }
        Ok(changed)
    }

    pub fn remove_all<'a>(&mut self, elements: impl IntoIterator<Item = &'a E>) -> Result<bool>
    where
        E: 'a,
    {
        let doomed: BTreeSet<&E> = elements.into_iter().collect();
        if doomed.is_empty() {
            return Ok(false);
        }
        let before = self.buffer.len();
        self.buffer.retain(|e| !doomed.contains(e));
        let mut changed = self.buffer.len() != before;
        changed |= self.rewrite_partitions(
            |p| doomed.range::<&E, _>(&p.first..=&p.last).next().is_some(),
            |e| !doomed.contains(e),
        )?;
        if changed {
            self.size_modified = true;
        }
        Ok(changed)
    }

    /// Keeps only the elements also present in `keep`.
    pub fn retain_all(&mut self, keep: &BTreeSet<E>) -> Result<bool> {
        self.retain(|e| keep.contains(e))
    }

    /// Keeps only the elements for which `predicate` returns `true`.
    pub fn retain(&mut self, mut predicate: impl FnMut(&E) -> bool) -> Result<bool> {
        let before = self.buffer.len();
        self.buffer.retain(|e| predicate(e));
        let mut changed = self.buffer.len() != before;
        changed |= self.rewrite_partitions(|_| true, predicate)?;
        if changed {
            self.size_modified = true;
        }
        Ok(changed)
    }

    /// Number of distinct elements.
    ///
    /// The count is cached; after a mutation that could not track it exactly
    /// it is recomputed with one merged pass over all partitions.
    pub fn len(&mut self) -> Result<usize> {
        if self.size_modified {
            let mut count = 0;
            for element in self.iter()? {
                element?;
                count += 1;
            }
            self.size = count;
            self.size_modified = false;
        }
        Ok(self.size)
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.partitions.is_empty()
    }

    pub fn first(&self) -> Option<&E> {
        let persisted = self.partitions.iter().map(|p| &p.first).min();
        match (self.buffer.first(), persisted) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn last(&self) -> Option<&E> {
        let persisted = self.partitions.iter().map(|p| &p.last).max();
        match (self.buffer.last(), persisted) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Returns a merged, ascending, duplicate-free iterator over the set.
    ///
    /// The iterator owns a snapshot of the buffer and its own partition
    /// readers; later mutations of the set are not observed.
    pub fn iter(&self) -> Result<SortedSetIter<E>> {
        let mut sources = Vec::with_capacity(self.partitions.len() + 1);
        sources.push(Source::Buffer(
            self.buffer.iter().cloned().collect::<Vec<_>>().into_iter(),
        ));
        for partition in &self.partitions {
            sources.push(Source::Partition(PartitionReader::open(
                partition.handler.as_ref(),
            )?));
        }
        SortedSetIter::new(sources)
    }

    /// Writes the buffer out as a new partition. A no-op for an empty buffer.
    pub fn persist(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let partition = self.write_new(self.buffer.iter())?;
        log::trace!(
            "persisted {} elements to {}",
            partition.len,
            partition.handler.name()
        );
        self.partitions.push(partition);
        self.buffer.clear();
        Ok(())
    }

    /// Removes every element and deletes all partition files.
    pub fn clear(&mut self) -> Result<()> {
        self.buffer.clear();
        while let Some(partition) = self.partitions.pop() {
            partition.handler.delete()?;
        }
        self.size = 0;
        self.size_modified = false;
        Ok(())
    }

    /// True when every element lives in a partition.
    pub fn is_persisted(&self) -> bool {
        self.buffer.is_empty() && !self.partitions.is_empty()
    }

    pub fn has_persisted_data(&self) -> bool {
        !self.partitions.is_empty()
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    fn write_new<'a, I>(&self, elements: I) -> Result<Partition<E>>
    where
        I: ExactSizeIterator<Item = &'a E> + DoubleEndedIterator + Clone,
        E: 'a,
    {
        let (Some(first), Some(last)) = (elements.clone().next(), elements.clone().next_back())
        else {
            return Err(Error::invalid_operation("persist of an empty partition"));
        };
        let (first, last) = (first.clone(), last.clone());
        let len = elements.len();
        let handler = self.factory.create_handler()?;
        if let Err(e) = write_partition(handler.as_ref(), elements) {
            if let Err(cleanup) = handler.delete() {
                log::warn!("failed to delete partial partition {}: {cleanup}", handler.name());
            }
            return Err(e);
        }
        Ok(Partition {
            handler,
            len,
            first,
            last,
        })
    }

    /// Loads each partition selected by `touches`, drops the elements
    /// rejected by `keep` and replaces the partition if anything changed.
    fn rewrite_partitions(
        &mut self,
        touches: impl Fn(&Partition<E>) -> bool,
        mut keep: impl FnMut(&E) -> bool,
    ) -> Result<bool> {
        let mut changed = false;
        let mut i = 0;
        while i < self.partitions.len() {
            if !touches(&self.partitions[i]) {
                i += 1;
                continue;
            }
            let elements = PartitionReader::<E>::load(self.partitions[i].handler.as_ref())?;
            let before = elements.len();
            let kept: Vec<E> = elements.into_iter().filter(|e| keep(e)).collect();
            if kept.len() == before {
                i += 1;
                continue;
            }
            changed = true;
            let old = if kept.is_empty() {
                self.partitions.remove(i)
            } else {
                let replacement = self.write_new(kept.iter())?;
                i += 1;
                std::mem::replace(&mut self.partitions[i - 1], replacement)
            };
            old.handler.delete()?;
        }
        Ok(changed)
    }
}

impl<E> Drop for ExternalSortedSet<E> {
    fn drop(&mut self) {
        for partition in self.partitions.drain(..) {
            if let Err(e) = partition.handler.delete() {
                log::warn!("failed to delete partition {}: {e}", partition.handler.name());
            }
        }
    }
}

impl<E> fmt::Debug for ExternalSortedSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalSortedSet")
            .field("buffered", &self.buffer.len())
            .field(
                "persisted",
                &self.partitions.iter().map(|p| p.len).sum::<usize>(),
            )
            .field("partitions", &self.partitions.len())
            .finish()
    }
}

enum Source<E> {
    Buffer(std::vec::IntoIter<E>),
    Partition(PartitionReader<E>),
}

impl<E: DeserializeOwned> Source<E> {
    fn pull(&mut self) -> Option<Result<E>> {
        match self {
            Source::Buffer(it) => it.next().map(Ok),
            Source::Partition(reader) => reader.next(),
        }
    }
}

/// K-way merge over the buffer snapshot and all partitions.
pub struct SortedSetIter<E> {
    sources: Vec<Source<E>>,
    heads: BinaryHeap<Reverse<(E, usize)>>,
    last: Option<E>,
}

impl<E> SortedSetIter<E>
where
    E: Ord + Clone + DeserializeOwned,
{
    fn new(mut sources: Vec<Source<E>>) -> Result<SortedSetIter<E>> {
        let mut heads = BinaryHeap::with_capacity(sources.len());
        for (index, source) in sources.iter_mut().enumerate() {
            if let Some(head) = source.pull() {
                heads.push(Reverse((head?, index)));
            }
        }
        Ok(SortedSetIter {
            sources,
            heads,
            last: None,
        })
    }
}

impl<E> Iterator for SortedSetIter<E>
where
    E: Ord + Clone + DeserializeOwned,
{
    type Item = Result<E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Reverse((element, index)) = self.heads.pop()?;
            match self.sources[index].pull() {
                Some(Ok(next)) => self.heads.push(Reverse((next, index))),
                Some(Err(e)) => {
                    self.heads.clear();
                    return Some(Err(e));
                }
                None => {}
            }
            if self.last.as_ref() == Some(&element) {
                continue;
            }
            self.last = Some(element.clone());
            return Some(Ok(element));
        }
    }
}
