use std::sync::Arc;

use quarry_arithmetic::pattern;
use quarry_common::{
    Result,
    error::{Error, PlanningErrorCode},
};
use quarry_iterators::{
    AndIterator, IndexIterator, NestedIterator, OrIterator, SortedListIterator,
    SortedSetIterator, UnsortedIterator, UnsortedOrIterator,
};
use quarry_source::FilterChain;

use super::plan::{PlanNode, RangePlan};
use crate::{environment::ShardEnvironment, options::QueryOptions};

/// An assembled subtree.
///
/// `iter` is `None` when the subtree cannot narrow the candidate set and
/// every document of the row must be considered. `exact` is false when the
/// candidates may include documents the expression rejects.
pub(crate) struct Assembled {
    pub iter: Option<Box<dyn NestedIterator>>,
    pub exact: bool,
    pub sorted: bool,
}

impl Assembled {
    fn leaf(iter: impl NestedIterator + 'static) -> Assembled {
        Assembled {
            iter: Some(Box::new(iter)),
            exact: true,
            sorted: true,
        }
    }

    fn unresolved() -> Assembled {
        Assembled {
            iter: None,
            exact: false,
            sorted: true,
        }
    }
}

pub(crate) struct Assembler<'a> {
    row: &'a str,
    env: &'a ShardEnvironment,
    options: &'a QueryOptions,
    filters: &'a FilterChain,
}

impl<'a> Assembler<'a> {
    pub fn new(
        row: &'a str,
        env: &'a ShardEnvironment,
        options: &'a QueryOptions,
        filters: &'a FilterChain,
    ) -> Assembler<'a> {
        Assembler {
            row,
            env,
            options,
            filters,
        }
    }

    pub fn assemble(&self, node: PlanNode) -> Result<Assembled> {
        match node {
            PlanNode::And { includes, excludes } => self.assemble_and(includes, excludes),
            PlanNode::Or { children } => self.assemble_or(children),
            PlanNode::Term { field, value } => {
                let iter = IndexIterator::new(self.env.sources.create()?, self.row, field, value)
                    .with_filters(self.filters.clone())
                    .with_seek_threshold(self.options.seek_threshold);
                Ok(Assembled::leaf(iter))
            }
            PlanNode::List {
                entries,
                description,
            } => Ok(Assembled::leaf(
                SortedListIterator::new(entries).with_description(description),
            )),
            PlanNode::Set { set, description } => {
                Ok(Assembled::leaf(SortedSetIterator::new(set, description)))
            }
            PlanNode::Empty { description } => Ok(Assembled::leaf(
                SortedListIterator::from_keys([]).with_description(format!("empty {description}")),
            )),
            PlanNode::Unsorted(plan) => self.assemble_unsorted(plan),
            PlanNode::Unresolved { description } => {
                log::trace!("{description} left to evaluation");
                Ok(Assembled::unresolved())
            }
            PlanNode::Range(_) | PlanNode::Ivarator(_) | PlanNode::Pending(_) => Err(
                Error::invalid_operation("assembling a plan that was not resolved"),
            ),
        }
    }

    fn assemble_unsorted(&self, plan: RangePlan) -> Result<Assembled> {
        let description = plan.description();
        let mut iter = UnsortedIterator::new(
            self.env.sources.create()?,
            plan.field(),
            plan.range.field_index_range(self.row),
        )
        .with_filters(self.filters.clone())
        .with_description(description);
        if let Some(pattern) = &plan.pattern {
            let regex = pattern::compile(pattern)?;
            iter = iter.with_matcher(Arc::new(move |value: &str| regex.is_match(value)));
        }
        Ok(Assembled {
            iter: Some(Box::new(iter)),
            exact: true,
            sorted: false,
        })
    }

    fn assemble_and(&self, includes: Vec<PlanNode>, excludes: Vec<PlanNode>) -> Result<Assembled> {
        let mut exact = true;
        let mut sorted = true;
        let mut include_iters = Vec::with_capacity(includes.len());
        for child in includes {
            let child = self.assemble(child)?;
            exact &= child.exact;
            sorted &= child.sorted;
            if let Some(iter) = child.iter {
                include_iters.push(iter);
            }
        }
        let mut exclude_iters = Vec::with_capacity(excludes.len());
        for child in excludes {
            let child = self.assemble(child)?;
            sorted &= child.sorted;
            // Only an exact exclusion may remove candidates.
            match child.iter {
                Some(iter) if child.exact => exclude_iters.push(iter),
                _ => exact = false,
            }
        }

        if include_iters.is_empty() {
            return Ok(Assembled {
                iter: None,
                exact: false,
                sorted: true,
            });
        }
        if !sorted {
            if include_iters.len() > 1 {
                return Err(Error::planning(
                    PlanningErrorCode::UnsortedIntersection,
                    "cannot intersect streams with unsorted document ids",
                ));
            }
            if !exclude_iters.is_empty() {
                exclude_iters.clear();
                exact = false;
            }
        }
        if include_iters.len() == 1 && exclude_iters.is_empty() {
            return Ok(Assembled {
                iter: include_iters.pop(),
                exact,
                sorted,
            });
        }
        let iter = AndIterator::new(include_iters, exclude_iters)?;
        Ok(Assembled {
            iter: Some(Box::new(iter)),
            exact,
            sorted,
        })
    }

    fn assemble_or(&self, children: Vec<PlanNode>) -> Result<Assembled> {
        let mut exact = true;
        let mut sorted = true;
        let mut iters = Vec::with_capacity(children.len());
        for child in children {
            let child = self.assemble(child)?;
            let Some(iter) = child.iter else {
                // An unresolved branch admits any document.
                return Ok(Assembled::unresolved());
            };
            exact &= child.exact;
            sorted &= child.sorted;
            iters.push(iter);
        }
        let iter: Box<dyn NestedIterator> = if sorted {
            Box::new(OrIterator::new(iters))
        } else {
            Box::new(UnsortedOrIterator::new(iters))
        };
        Ok(Assembled {
            iter: Some(iter),
            exact,
            sorted,
        })
    }
}
