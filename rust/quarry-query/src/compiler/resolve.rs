//! Resolution: bounded range scans and ivarator population.
//!
//! Range leaves are scanned into memory while they stay under the expansion
//! thresholds and escalate to ivarators otherwise. Every ivarator is split
//! into population tasks that run on the worker pool, each with a cursor
//! checked out of a bounded [`SourcePool`], writing into the ivarator's own
//! external sorted set. All tasks are joined before assembly.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex, PoisonError},
};

use ahash::HashSet;
use quarry_arithmetic::{Document, ValueTuple, pattern};
use quarry_common::{KeyBudget, Result, ScanBudget, error::Error};
use quarry_iterators::FieldPosting;
use quarry_sorted_set::ExternalSortedSet;
use quarry_source::{
    DocumentKey, FilterChain, Range, SourcePool,
    field_index::{self, FieldIndexEntry},
};
use quarry_workflow::{JoinError, JoinHandle};
use regex::Regex;

use super::plan::{IvaratorPlan, PlanNode, RangePlan};
use crate::{environment::ShardEnvironment, options::QueryOptions};

type SharedSet = Arc<Mutex<ExternalSortedSet<FieldPosting>>>;

/// What resolution learned about the plan.
#[derive(Debug, Default)]
pub(crate) struct Resolution {
    pub ivarator_count: usize,
    pub threshold_exceeded_fields: BTreeSet<String>,
}

enum RangeScan {
    Complete(BTreeMap<DocumentKey, Document>),
    Escalate,
    TimedOut,
}

struct PendingIvarator {
    field: String,
    description: String,
    set: SharedSet,
    handles: Vec<JoinHandle<Result<u64>>>,
}

pub(crate) struct Resolver<'a> {
    row: &'a str,
    env: &'a ShardEnvironment,
    options: &'a QueryOptions,
    filters: &'a FilterChain,
    budget: ScanBudget,
    pool: Option<Arc<SourcePool>>,
    pending: Vec<PendingIvarator>,
    exceeded: BTreeSet<String>,
}

impl<'a> Resolver<'a> {
    /// # Arguments
    ///
    /// * `budget` - Deadline for range scans and ivarator population. Expiry
    ///   turns the affected leaves into unresolved ones rather than failing.
    pub fn new(
        row: &'a str,
        env: &'a ShardEnvironment,
        options: &'a QueryOptions,
        filters: &'a FilterChain,
        budget: ScanBudget,
    ) -> Resolver<'a> {
        Resolver {
            row,
            env,
            options,
            filters,
            budget,
            pool: None,
            pending: Vec::new(),
            exceeded: BTreeSet::new(),
        }
    }

    pub fn resolve(mut self, plan: &mut PlanNode) -> Result<Resolution> {
        self.resolve_ranges(plan)?;
        self.start_ivarators(plan)?;
        let ivarator_count = self.pending.len();
        let mut finished = Vec::with_capacity(ivarator_count);
        for ivarator in std::mem::take(&mut self.pending) {
            finished.push(Some(self.finish(ivarator)?));
        }
        fill_pending(plan, &mut finished);
        Ok(Resolution {
            ivarator_count,
            threshold_exceeded_fields: self.exceeded,
        })
    }

    fn resolve_ranges(&mut self, node: &mut PlanNode) -> Result<()> {
        match node {
            PlanNode::And { includes, excludes } => {
                for child in includes.iter_mut().chain(excludes.iter_mut()) {
                    self.resolve_ranges(child)?;
                }
            }
            PlanNode::Or { children } => {
                for child in children {
                    self.resolve_ranges(child)?;
                }
            }
            PlanNode::Range(plan) => {
                let resolved = match self.scan_range(plan)? {
                    RangeScan::Complete(entries) => PlanNode::List {
                        entries,
                        description: plan.description(),
                    },
                    RangeScan::Escalate if self.options.sorted_uids => {
                        log::debug!(
                            "{} exceeded the expansion thresholds in {}; using an ivarator",
                            plan.description(),
                            self.row
                        );
                        PlanNode::Ivarator(plan.clone().into_ivarator())
                    }
                    RangeScan::Escalate => PlanNode::Unsorted(plan.clone()),
                    RangeScan::TimedOut => {
                        log::warn!(
                            "range scan of {} in {} ran out of time; deferring it",
                            plan.description(),
                            self.row
                        );
                        self.exceeded.insert(plan.field().to_string());
                        PlanNode::Unresolved {
                            description: plan.description(),
                        }
                    }
                };
                *node = resolved;
            }
            _ => {}
        }
        Ok(())
    }

    /// Scans a range into memory, giving up as soon as it holds more distinct
    /// values than the value expansion threshold or more postings than an
    /// ivarator buffer.
    fn scan_range(&self, plan: &RangePlan) -> Result<RangeScan> {
        let mut entries: BTreeMap<DocumentKey, Document> = BTreeMap::new();
        if plan.range.is_empty() {
            return Ok(RangeScan::Complete(entries));
        }
        let matcher = plan.pattern.as_deref().map(pattern::compile).transpose()?;
        let mut source = self.env.sources.create()?;
        let families = vec![field_index::field_index_family(plan.field())];
        source.seek(&plan.range.field_index_range(self.row), &families, true)?;

        let mut values: HashSet<String> = HashSet::default();
        let mut postings = KeyBudget::new(self.options.ivarator_cache_buffer_size as u64);
        while let Some(key) = source.top_key() {
            if self.budget.is_expired() {
                return Ok(RangeScan::TimedOut);
            }
            let key = key.clone();
            source.next()?;
            if !self.filters.accept(&key) {
                continue;
            }
            let entry = FieldIndexEntry::parse(&key)?;
            if matcher.as_ref().is_some_and(|m| !m.is_match(&entry.value)) {
                continue;
            }
            if !values.contains(&entry.value) {
                values.insert(entry.value.clone());
                if values.len() > self.options.value_expansion_threshold {
                    return Ok(RangeScan::Escalate);
                }
            }
            if !postings.charge(1) {
                return Ok(RangeScan::Escalate);
            }
            let tuple = ValueTuple::new(entry.field.clone(), entry.value.clone()).with_source(key.clone());
            entries
                .entry(entry.document_key(&key.row))
                .or_default()
                .put(tuple);
        }
        log::trace!(
            "{} resolved to {} documents in {}",
            plan.description(),
            entries.len(),
            self.row
        );
        Ok(RangeScan::Complete(entries))
    }

    fn start_ivarators(&mut self, node: &mut PlanNode) -> Result<()> {
        match node {
            PlanNode::And { includes, excludes } => {
                for child in includes.iter_mut().chain(excludes.iter_mut()) {
                    self.start_ivarators(child)?;
                }
            }
            PlanNode::Or { children } => {
                for child in children {
                    self.start_ivarators(child)?;
                }
            }
            PlanNode::Ivarator(plan) => {
                let id = self.spawn(plan)?;
                *node = PlanNode::Pending(id);
            }
            _ => {}
        }
        Ok(())
    }

    fn source_pool(&mut self) -> Result<Arc<SourcePool>> {
        if let Some(pool) = &self.pool {
            return Ok(pool.clone());
        }
        let pool = SourcePool::new(self.env.sources.clone(), self.options.max_ivarator_sources)?;
        self.pool = Some(pool.clone());
        Ok(pool)
    }

    fn spawn(&mut self, plan: &IvaratorPlan) -> Result<usize> {
        let pool = self.source_pool()?;
        let set = ExternalSortedSet::with_persist_threshold(
            self.env.spill.clone(),
            self.options.ivarator_cache_buffer_size,
        )?;
        let set: SharedSet = Arc::new(Mutex::new(set));
        let matcher = plan.pattern().map(pattern::compile).transpose()?;

        let mut handles = Vec::new();
        for ranges in scan_ranges(plan, self.row, self.options.max_range_split) {
            let task = PopulationTask {
                pool: pool.clone(),
                set: set.clone(),
                field: plan.field().to_string(),
                ranges,
                matcher: matcher.clone(),
                filters: self.filters.clone(),
                budget: self.budget,
                persist_threshold: self.options.ivarator_persist_threshold.max(1) as u64,
            };
            handles.push(self.env.thread_pool.spawn(move || task.run()));
        }
        log::debug!(
            "populating ivarator for {} in {} with {} task(s)",
            plan.description(),
            self.row,
            handles.len()
        );
        self.pending.push(PendingIvarator {
            field: plan.field().to_string(),
            description: plan.description(),
            set,
            handles,
        });
        Ok(self.pending.len() - 1)
    }

    /// Waits for every population task of `ivarator` and turns it into a
    /// sorted set leaf, or an unresolved one when the deadline hit.
    fn finish(&mut self, ivarator: PendingIvarator) -> Result<PlanNode> {
        let mut timed_out = false;
        let mut scanned = 0;
        for handle in ivarator.handles {
            let outcome = match self.budget.remaining() {
                Some(remaining) => handle.join_timeout(remaining).map_err(|(e, _)| e),
                None => handle.join(),
            };
            match outcome {
                Ok(Ok(count)) => scanned += count,
                Ok(Err(e)) if e.is_deadline_exceeded() => timed_out = true,
                Ok(Err(e)) => return Err(e),
                Err(JoinError::Timeout) => timed_out = true,
                Err(JoinError::Canceled) => {
                    return Err(Error::storage(format!(
                        "population of {} was canceled",
                        ivarator.description
                    )));
                }
            }
        }
        if timed_out {
            log::warn!(
                "ivarator for {} in {} did not complete in time; deferring it",
                ivarator.description,
                self.row
            );
            self.exceeded.insert(ivarator.field);
            return Ok(PlanNode::Unresolved {
                description: ivarator.description,
            });
        }
        let set = Arc::try_unwrap(ivarator.set)
            .map_err(|_| Error::invalid_operation("ivarator set still shared after population"))?
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        log::debug!(
            "ivarator for {} in {} scanned {scanned} postings into {} partition(s)",
            ivarator.description,
            self.row,
            set.partition_count()
        );
        Ok(PlanNode::Set {
            set,
            description: ivarator.description,
        })
    }
}

/// One range of a population task. `exact` is set for value-list terms,
/// whose range also covers longer values that embed a delimiter.
#[derive(Clone, Debug, PartialEq)]
struct ScanRange {
    range: Range,
    exact: Option<String>,
}

/// Splits an ivarator into per-task scan ranges. A value list yields at most
/// `max_split` tasks.
fn scan_ranges(plan: &IvaratorPlan, row: &str, max_split: usize) -> Vec<Vec<ScanRange>> {
    match plan {
        IvaratorPlan::Regex(plan) | IvaratorPlan::Range(plan) => vec![vec![ScanRange {
            range: plan.range.field_index_range(row),
            exact: None,
        }]],
        IvaratorPlan::List { field, values } => {
            let chunk = values.len().div_ceil(max_split.max(1)).max(1);
            values
                .chunks(chunk)
                .map(|chunk| {
                    chunk
                        .iter()
                        .map(|value| ScanRange {
                            range: field_index::term_range(row, field, value),
                            exact: Some(value.clone()),
                        })
                        .collect()
                })
                .collect()
        }
    }
}

fn fill_pending(node: &mut PlanNode, finished: &mut [Option<PlanNode>]) {
    match node {
        PlanNode::And { includes, excludes } => {
            for child in includes.iter_mut().chain(excludes.iter_mut()) {
                fill_pending(child, finished);
            }
        }
        PlanNode::Or { children } => {
            for child in children {
                fill_pending(child, finished);
            }
        }
        PlanNode::Pending(id) => {
            let id = *id;
            if let Some(resolved) = finished.get_mut(id).and_then(Option::take) {
                *node = resolved;
            }
        }
        _ => {}
    }
}

/// One population task: scans its ranges and adds every accepted posting to
/// the shared set.
struct PopulationTask {
    pool: Arc<SourcePool>,
    set: SharedSet,
    field: String,
    ranges: Vec<ScanRange>,
    matcher: Option<Regex>,
    filters: FilterChain,
    budget: ScanBudget,
    persist_threshold: u64,
}

impl PopulationTask {
    /// Returns the number of postings added.
    fn run(self) -> Result<u64> {
        let mut source = self.pool.checkout(&self.budget)?;
        let families = vec![field_index::field_index_family(&self.field)];
        let mut scanned = 0u64;
        for ScanRange { range, exact } in &self.ranges {
            source.seek(range, &families, true)?;
            while let Some(key) = source.top_key() {
                self.budget.check("populating an ivarator")?;
                let key = key.clone();
                source.next()?;
                if !self.filters.accept(&key) {
                    continue;
                }
                let entry = FieldIndexEntry::parse(&key)?;
                if exact.as_ref().is_some_and(|v| *v != entry.value) {
                    continue;
                }
                if self
                    .matcher
                    .as_ref()
                    .is_some_and(|m| !m.is_match(&entry.value))
                {
                    continue;
                }
                let posting = FieldPosting::new(
                    entry.document_key(&key.row),
                    entry.field,
                    entry.value,
                );
                let mut set = self.set.lock().unwrap_or_else(PoisonError::into_inner);
                set.add(posting)?;
                scanned += 1;
                if scanned % self.persist_threshold == 0 {
                    set.persist()?;
                }
            }
        }
        Ok(scanned)
    }
}

#[cfg(test)]
mod tests {
    use quarry_planner::LiteralRange;

    use super::*;

    #[test]
    fn test_value_list_split() {
        let plan = IvaratorPlan::List {
            field: "COLOR".to_string(),
            values: (0..25).map(|i| format!("v{i:02}")).collect(),
        };
        let ranges = scan_ranges(&plan, "row", 11);
        assert!(ranges.len() <= 11);
        assert_eq!(ranges.iter().map(Vec::len).sum::<usize>(), 25);

        let single = IvaratorPlan::List {
            field: "COLOR".to_string(),
            values: vec!["red".to_string()],
        };
        assert_eq!(scan_ranges(&single, "row", 11).len(), 1);

        let regex = IvaratorPlan::Regex(RangePlan {
            range: LiteralRange::new("COLOR"),
            pattern: Some(".*".to_string()),
        });
        assert_eq!(scan_ranges(&regex, "row", 11), vec![vec![ScanRange {
            range: LiteralRange::new("COLOR").field_index_range("row"),
            exact: None,
        }]]);
        let list = scan_ranges(&single, "row", 11);
        assert_eq!(list[0][0].exact.as_deref(), Some("red"));
    }
}
