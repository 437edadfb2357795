//! Regex term expansion over whole expressions.
//!
//! Before a query reaches the shards, regex leaves on text fields are
//! expanded against the global index into the concrete values they match.
//! Small expansions become an OR of equality terms, larger ones a value list
//! marker, and expansions cut short by a threshold are marked so the
//! compiler builds an ivarator instead.

use std::collections::BTreeSet;

use quarry_arithmetic::Normalizer;
use quarry_common::{Result, ScanBudget};
use quarry_planner::{ShardMetadata, lookup_terms_from_regex};
use quarry_source::SortedSource;

use crate::{
    expression::{Expression, Literal},
    options::QueryOptions,
};

/// An expanded expression and what the expansion ran into.
#[derive(Debug)]
pub struct Expansion {
    pub expression: Expression,
    /// Fields whose expansion stopped at a threshold or deadline.
    pub threshold_exceeded_fields: BTreeSet<String>,
    /// Number of regex leaves replaced by concrete values.
    pub expanded: usize,
}

pub struct TermExpander<'a> {
    metadata: &'a dyn ShardMetadata,
    options: &'a QueryOptions,
    forward: Box<dyn SortedSource>,
    reverse: Option<Box<dyn SortedSource>>,
    budget: ScanBudget,
    exceeded: BTreeSet<String>,
    expanded: usize,
}

impl<'a> TermExpander<'a> {
    /// # Arguments
    ///
    /// * `forward` - Cursor over the global forward index.
    pub fn new(
        metadata: &'a dyn ShardMetadata,
        options: &'a QueryOptions,
        forward: Box<dyn SortedSource>,
    ) -> TermExpander<'a> {
        TermExpander {
            metadata,
            options,
            forward,
            reverse: None,
            budget: ScanBudget::unlimited(),
            exceeded: BTreeSet::new(),
            expanded: 0,
        }
    }

    /// Enables suffix-anchored patterns on reverse indexed fields.
    pub fn with_reverse(mut self, reverse: Box<dyn SortedSource>) -> TermExpander<'a> {
        self.reverse = Some(reverse);
        self
    }

    pub fn with_budget(mut self, budget: ScanBudget) -> TermExpander<'a> {
        self.budget = budget;
        self
    }

    pub fn expand(mut self, expression: &Expression) -> Result<Expansion> {
        let expression = self.rewrite(expression)?;
        Ok(Expansion {
            expression,
            threshold_exceeded_fields: self.exceeded,
            expanded: self.expanded,
        })
    }

    fn rewrite(&mut self, expression: &Expression) -> Result<Expression> {
        Ok(match expression {
            Expression::And { children } => Expression::and(self.rewrite_all(children)?),
            Expression::Or { children } => Expression::or(self.rewrite_all(children)?),
            Expression::Not { child } => Expression::not(self.rewrite(child)?),
            Expression::Regex { field, pattern } => self.expand_regex(field, pattern)?,
            Expression::NotRegex { field, pattern } => {
                match self.expand_regex(field, pattern)? {
                    Expression::Regex { .. } => expression.clone(),
                    expanded => Expression::not(expanded),
                }
            }
            // Markers were placed deliberately and comparisons need no
            // expansion.
            other => other.clone(),
        })
    }

    fn rewrite_all(&mut self, children: &[Expression]) -> Result<Vec<Expression>> {
        children.iter().map(|child| self.rewrite(child)).collect()
    }

    fn expand_regex(&mut self, field: &str, pattern: &str) -> Result<Expression> {
        let unchanged = || Expression::regex(field, pattern);
        if !self.options.is_field_allowed(field) || !self.metadata.is_indexed(field) {
            return Ok(unchanged());
        }
        let normalizer = self.metadata.normalizer(field);
        if !matches!(normalizer, Normalizer::Verbatim | Normalizer::LowerCase) {
            return Ok(unchanged());
        }
        let normalized = normalizer.normalize_regex(pattern)?;

        let mut lookup = self.options.lookup_options(vec![field.to_string()]);
        lookup.budget = self.budget;
        let reverse: Option<&mut dyn SortedSource> = match self.reverse.as_mut() {
            Some(reverse) => Some(reverse.as_mut()),
            None => None,
        };
        let map = lookup_terms_from_regex(
            &[normalized],
            self.forward.as_mut(),
            reverse,
            self.metadata,
            &lookup,
        )?;

        let Some(values) = map.get(field) else {
            if map.is_threshold_exceeded() {
                return Ok(self.exceeded_value(field, pattern));
            }
            log::debug!("{field} =~ '{pattern}' matched nothing in the global index");
            return Ok(unchanged());
        };
        if values.is_threshold_exceeded() {
            return Ok(self.exceeded_value(field, pattern));
        }
        if values.is_empty() {
            return Ok(unchanged());
        }
        self.expanded += 1;
        log::debug!(
            "{field} =~ '{pattern}' expanded to {} value(s)",
            values.len()
        );
        if values.len() > self.options.or_expansion_threshold {
            return Ok(Expression::exceeded_or_threshold(
                field,
                values.values().iter().cloned(),
            ));
        }
        let terms: Vec<Expression> = values
            .values()
            .iter()
            .map(|value| Expression::eq(field, Literal::Str(value.clone())))
            .collect();
        Ok(match <[Expression; 1]>::try_from(terms) {
            Ok([term]) => term,
            Err(terms) => Expression::or(terms),
        })
    }

    fn exceeded_value(&mut self, field: &str, pattern: &str) -> Expression {
        log::info!("expansion of {field} =~ '{pattern}' exceeded a threshold");
        self.exceeded.insert(field.to_string());
        Expression::exceeded_value_threshold(Expression::regex(field, pattern))
    }
}
