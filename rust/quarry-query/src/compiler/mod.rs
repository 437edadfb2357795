//! Turns a query expression into a nested iterator tree for one shard row.
//!
//! Compilation runs in three stages:
//!
//! 1. **Plan**: the expression is normalized against shard metadata into a
//!    plan tree. Unindexed or excluded fields become unresolved leaves,
//!    unknown fields become empty ones, and negations are attached to their
//!    enclosing intersection.
//! 2. **Resolve**: range leaves are scanned into memory or escalated to
//!    ivarators, which are populated in parallel on the worker pool.
//! 3. **Assemble**: the resolved plan is turned into iterators. A subtree
//!    that cannot narrow the candidates marks the query as not fully
//!    satisfied by the index, and the evaluator decides.

mod assemble;
mod plan;
mod resolve;

use std::collections::BTreeSet;

use quarry_common::{Result, ScanBudget};
use quarry_iterators::{NestedIterator, describe_tree};
use quarry_source::FilterChain;

use crate::{environment::ShardEnvironment, expression::Expression, options::QueryOptions};

use assemble::Assembler;
use plan::Planner;
use resolve::Resolver;

/// The iterator tree of one query over one row.
pub struct CompiledQuery {
    /// `None` when the index cannot narrow the candidates; every document of
    /// the row must then be evaluated.
    pub root: Option<Box<dyn NestedIterator>>,
    /// True when every candidate the tree yields satisfies the expression.
    pub fully_satisfied: bool,
    pub ivarator_count: usize,
    /// Fields whose range or ivarator scan hit a threshold or deadline.
    pub threshold_exceeded_fields: BTreeSet<String>,
}

impl CompiledQuery {
    pub fn describe(&self) -> String {
        match &self.root {
            Some(root) => describe_tree(root.as_ref()),
            None => "full scan".to_string(),
        }
    }
}

impl std::fmt::Debug for CompiledQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledQuery")
            .field("root", &self.describe())
            .field("fully_satisfied", &self.fully_satisfied)
            .field("ivarator_count", &self.ivarator_count)
            .field("threshold_exceeded_fields", &self.threshold_exceeded_fields)
            .finish()
    }
}

pub struct Compiler<'a> {
    env: &'a ShardEnvironment,
    options: &'a QueryOptions,
    filters: FilterChain,
}

impl<'a> Compiler<'a> {
    /// Creates a compiler using the filters configured in `options`.
    ///
    /// # Errors
    ///
    /// When a configured filter is not registered or rejects its options.
    pub fn new(env: &'a ShardEnvironment, options: &'a QueryOptions) -> Result<Compiler<'a>> {
        Ok(Compiler {
            env,
            options,
            filters: options.resolve_filters()?,
        })
    }

    /// Replaces the configured filters.
    pub fn with_filters(mut self, filters: FilterChain) -> Compiler<'a> {
        self.filters = filters;
        self
    }

    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    /// Compiles `expression` for `row`.
    ///
    /// Range scans and ivarator population are bounded by `budget` narrowed
    /// to the ivarator scan timeout.
    ///
    /// # Errors
    ///
    /// A planning error for expressions the engine rejects (a negated root,
    /// an excluded root field, malformed range markers, bad patterns,
    /// intersections over unsorted ids), or any storage error raised while
    /// resolving.
    pub fn compile(
        &self,
        expression: &Expression,
        row: &str,
        budget: &ScanBudget,
    ) -> Result<CompiledQuery> {
        let mut plan =
            Planner::new(self.env.metadata.as_ref(), self.options).plan(expression)?;
        log::trace!("plan for {row}: {plan}");

        let scan_budget = budget.narrowed(self.options.ivarator_scan_timeout());
        let resolution =
            Resolver::new(row, self.env, self.options, &self.filters, scan_budget)
                .resolve(&mut plan)?;

        let assembled =
            Assembler::new(row, self.env, self.options, &self.filters).assemble(plan)?;
        let compiled = CompiledQuery {
            root: assembled.iter,
            fully_satisfied: assembled.exact && resolution.threshold_exceeded_fields.is_empty(),
            ivarator_count: resolution.ivarator_count,
            threshold_exceeded_fields: resolution.threshold_exceeded_fields,
        };
        log::trace!("iterator tree for {row}: {}", compiled.describe());
        Ok(compiled)
    }
}
