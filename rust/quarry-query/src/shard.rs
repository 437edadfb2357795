//! Running a query over one shard row.
//!
//! [`ShardQuery`] compiles the expression for a row, drives the resulting
//! iterator tree, fetches each candidate's stored attributes and evaluates
//! the expression against them. Results are produced lazily.

use std::{collections::BTreeSet, sync::Arc};

use quarry_arithmetic::{Document, ValueTuple};
use quarry_common::{Result, ScanBudget, try_or_ret_some_err};
use quarry_iterators::{DocumentScanIterator, NestedIterator};
use quarry_planner::ShardMetadata;
use quarry_source::{
    DocumentKey, FilterChain, SortedSource,
    field_index::{self, EventEntry, FieldIndexEntry},
};

use crate::{
    compiler::{CompiledQuery, Compiler},
    environment::ShardEnvironment,
    evaluate::Evaluator,
    expression::Expression,
    options::QueryOptions,
};

/// One evaluated candidate.
#[derive(Clone, Debug)]
pub struct QueryResult {
    pub key: DocumentKey,
    /// Stored attributes plus any index-only attributes the tree collected.
    pub document: Document,
    pub matched: bool,
    /// Attributes that satisfied the query, when hit lists are enabled.
    pub hits: Option<Vec<ValueTuple>>,
}

pub struct ShardQuery {
    expression: Expression,
    env: ShardEnvironment,
    options: QueryOptions,
    filters: FilterChain,
}

impl ShardQuery {
    /// # Errors
    ///
    /// When a filter named in `options` cannot be created.
    pub fn new(
        expression: Expression,
        env: ShardEnvironment,
        options: QueryOptions,
    ) -> Result<ShardQuery> {
        let filters = options.resolve_filters()?;
        Ok(ShardQuery {
            expression,
            env,
            options,
            filters,
        })
    }

    /// Replaces the filters configured in the options.
    pub fn with_filters(mut self, filters: FilterChain) -> ShardQuery {
        self.filters = filters;
        self
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn compile(&self, row: &str, budget: &ScanBudget) -> Result<CompiledQuery> {
        Compiler::new(&self.env, &self.options)?
            .with_filters(self.filters.clone())
            .compile(&self.expression, row, budget)
    }

    /// Compiles the query for `row` and returns the stream of evaluated
    /// candidates.
    pub fn run(&self, row: &str) -> Result<ShardQueryIterator> {
        let budget = match self.options.query_timeout() {
            Some(timeout) => ScanBudget::with_timeout(timeout),
            None => ScanBudget::unlimited(),
        };
        let compiled = self.compile(row, &budget)?;
        let description = compiled.describe();
        log::debug!(
            "running {} over {row} (fully satisfied: {}, ivarators: {})",
            self.expression,
            compiled.fully_satisfied,
            compiled.ivarator_count
        );
        let index_only_fields = self
            .expression
            .fields()
            .into_iter()
            .filter(|field| self.env.metadata.is_index_only(field))
            .map(str::to_string)
            .collect();
        let root: Box<dyn NestedIterator> = match compiled.root {
            Some(root) => root,
            None => Box::new(
                DocumentScanIterator::new(self.env.sources.create()?, row)
                    .with_filters(self.filters.clone()),
            ),
        };
        Ok(ShardQueryIterator {
            expression: self.expression.clone(),
            root,
            description,
            fully_satisfied: compiled.fully_satisfied,
            threshold_exceeded_fields: compiled.threshold_exceeded_fields,
            fetcher: DocumentFetcher {
                source: self.env.sources.create()?,
                metadata: self.env.metadata.clone(),
                filters: self.filters.clone(),
                index_only_fields,
            },
            evaluator: Evaluator::new(self.env.metadata.clone(), self.options.hit_list),
            hit_list: self.options.hit_list,
            budget,
            initialized: false,
        })
    }
}

/// Lazily yields one [`QueryResult`] per candidate of the iterator tree.
pub struct ShardQueryIterator {
    expression: Expression,
    root: Box<dyn NestedIterator>,
    description: String,
    fully_satisfied: bool,
    threshold_exceeded_fields: BTreeSet<String>,
    fetcher: DocumentFetcher,
    evaluator: Evaluator,
    hit_list: bool,
    budget: ScanBudget,
    initialized: bool,
}

impl ShardQueryIterator {
    /// True when the index alone decided every candidate.
    pub fn is_fully_satisfied(&self) -> bool {
        self.fully_satisfied
    }

    pub fn threshold_exceeded_fields(&self) -> &BTreeSet<String> {
        &self.threshold_exceeded_fields
    }

    /// The iterator tree, or `full scan` when the index could not be used.
    pub fn plan(&self) -> &str {
        &self.description
    }

    /// Keeps only the documents that satisfy the expression.
    pub fn matching(self) -> impl Iterator<Item = Result<QueryResult>> {
        self.filter(|result| result.as_ref().map_or(true, |r| r.matched))
    }

    fn evaluate(&mut self, key: DocumentKey) -> Result<QueryResult> {
        let mut document = self.fetcher.fetch(&key)?;
        for tuple in self.root.document().tuples() {
            if self.fetcher.metadata.is_index_only(&tuple.field)
                || !document.contains_field(&tuple.field)
            {
                document.put(tuple.clone());
            }
        }
        self.fetcher.fetch_index_only(&key, &mut document)?;
        let matched = self.evaluator.evaluate(&self.expression, &document)?;
        let hits = self.evaluator.take_hits();
        log::trace!("{key}: matched={matched}");
        Ok(QueryResult {
            key,
            document,
            matched,
            hits: self.hit_list.then(|| if matched { hits } else { Vec::new() }),
        })
    }
}

impl Iterator for ShardQueryIterator {
    type Item = Result<QueryResult>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.initialized {
            self.initialized = true;
            try_or_ret_some_err!(self.root.initialize(&self.budget));
        }
        let key = try_or_ret_some_err!(self.root.next(&self.budget))?;
        Some(self.evaluate(key))
    }
}

/// Reads the stored attributes of a document.
struct DocumentFetcher {
    source: Box<dyn SortedSource>,
    metadata: Arc<dyn ShardMetadata>,
    filters: FilterChain,
    /// Index-only fields the expression refers to.
    index_only_fields: Vec<String>,
}

impl DocumentFetcher {
    fn fetch(&mut self, key: &DocumentKey) -> Result<Document> {
        let mut document = Document::new();
        self.source.seek(&field_index::document_range(key), &[], false)?;
        while let Some(stored) = self.source.top_key() {
            if self.filters.accept(stored) {
                let entry = EventEntry::parse(stored)?;
                let normalizer = self.metadata.normalizer(&entry.field);
                document.put(
                    ValueTuple::normalize(entry.field, entry.value, normalizer)
                        .with_source(stored.clone()),
                );
            }
            self.source.next()?;
        }
        Ok(document)
    }

    /// Loads the postings of every referenced index-only field the document
    /// does not carry yet, e.g. when the tree did not read that field.
    fn fetch_index_only(&mut self, key: &DocumentKey, document: &mut Document) -> Result<()> {
        for field in &self.index_only_fields {
            if document.contains_field(field) {
                continue;
            }
            let families = [field_index::field_index_family(field)];
            self.source
                .seek(&field_index::field_range(&key.row, field), &families, true)?;
            while let Some(posting) = self.source.top_key() {
                if field_index::parse_pointer(posting).as_ref() == Some(&key.pointer)
                    && self.filters.accept(posting)
                {
                    let entry = FieldIndexEntry::parse(posting)?;
                    document.put(
                        ValueTuple::new(entry.field, entry.value).with_source(posting.clone()),
                    );
                }
                self.source.next()?;
            }
        }
        Ok(())
    }
}
