//! Final evaluation of the expression against a fetched document.
//!
//! Candidates from the iterator tree are only guaranteed to match when the
//! tree fully satisfies the query, so every candidate is re-checked here with
//! the existential arithmetic. Marker nodes evaluate the subtree they wrap.

use std::sync::Arc;

use quarry_arithmetic::{Arithmetic, Document, Normalizer, PatternCache, Value, ValueTuple};
use quarry_common::Result;
use quarry_planner::ShardMetadata;

use crate::expression::{Expression, Literal};

const PATTERN_CACHE_CAPACITY: usize = 256;

pub struct Evaluator {
    metadata: Arc<dyn ShardMetadata>,
    /// Used outside negations; records hits when enabled.
    arithmetic: Arithmetic,
    /// Used under a negation, where a satisfied comparison is not a hit.
    quiet: Arithmetic,
}

impl Evaluator {
    pub fn new(metadata: Arc<dyn ShardMetadata>, hit_list: bool) -> Evaluator {
        let patterns = Arc::new(PatternCache::new(PATTERN_CACHE_CAPACITY));
        let mut arithmetic = Arithmetic::new().with_pattern_cache(patterns.clone());
        if hit_list {
            arithmetic = arithmetic.with_hit_list();
        }
        Evaluator {
            metadata,
            arithmetic,
            quiet: Arithmetic::new().with_pattern_cache(patterns),
        }
    }

    pub fn evaluate(&mut self, expression: &Expression, document: &Document) -> Result<bool> {
        self.eval(expression, document, false)
    }

    /// Tuples that satisfied a non-negated comparison since the last call.
    pub fn take_hits(&mut self) -> Vec<ValueTuple> {
        self.arithmetic.take_hits()
    }

    fn eval(&mut self, expression: &Expression, document: &Document, negated: bool) -> Result<bool> {
        match expression {
            Expression::And { children } | Expression::BoundedRange { children } => {
                for child in children {
                    if !self.eval(child, document, negated)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Expression::Or { children } => {
                let mut result = false;
                // With a hit list every satisfied branch contributes hits.
                for child in children {
                    if self.eval(child, document, negated)? {
                        result = true;
                        if !self.arithmetic.is_hit_list() || negated {
                            break;
                        }
                    }
                }
                Ok(result)
            }
            Expression::Not { child } => Ok(!self.eval(child, document, true)?),
            Expression::ExceededValueThreshold { child } | Expression::Delayed { child } => {
                self.eval(child, document, negated)
            }
            Expression::ExceededOrThreshold { field, values } => {
                let normalizer = self.metadata.normalizer(field);
                let left = document.get(field);
                let right = Value::set(
                    values
                        .iter()
                        .map(|v| Value::Str(normalize_or_raw(normalizer, v))),
                );
                self.arithmetic_for(negated).equals(&left, &right)
            }
            Expression::Eq { field, value } => {
                self.compare(field, value, document, negated, Arithmetic::equals)
            }
            Expression::Ne { field, value } => {
                self.compare(field, value, document, negated, Arithmetic::not_equals)
            }
            Expression::Lt { field, value } => {
                self.compare(field, value, document, negated, Arithmetic::less_than)
            }
            Expression::Le { field, value } => {
                self.compare(field, value, document, negated, Arithmetic::less_than_or_equal)
            }
            Expression::Gt { field, value } => {
                self.compare(field, value, document, negated, Arithmetic::greater_than)
            }
            Expression::Ge { field, value } => {
                self.compare(field, value, document, negated, Arithmetic::greater_than_or_equal)
            }
            Expression::Regex { field, pattern } => {
                let right = self.pattern_operand(field, pattern);
                self.arithmetic_for(negated).matches(&document.get(field), &right)
            }
            Expression::NotRegex { field, pattern } => {
                let right = self.pattern_operand(field, pattern);
                self.quiet.not_matches(&document.get(field), &right)
            }
        }
    }

    fn compare(
        &mut self,
        field: &str,
        literal: &Literal,
        document: &Document,
        negated: bool,
        op: fn(&mut Arithmetic, &Value, &Value) -> Result<bool>,
    ) -> Result<bool> {
        let right = self.literal_operand(field, literal);
        op(self.arithmetic_for(negated), &document.get(field), &right)
    }

    fn arithmetic_for(&mut self, negated: bool) -> &mut Arithmetic {
        if negated {
            &mut self.quiet
        } else {
            &mut self.arithmetic
        }
    }

    /// Converts a literal into an operand comparable with the field's
    /// document values. Strings, and anything compared against an encoded
    /// field, go through the field normalizer.
    fn literal_operand(&self, field: &str, literal: &Literal) -> Value {
        let normalizer = self.metadata.normalizer(field);
        let encoded = matches!(normalizer, Normalizer::Number | Normalizer::IpAddress);
        match literal {
            Literal::Null => Value::Null,
            Literal::Str(s) => Value::Str(normalize_or_raw(normalizer, s)),
            other if encoded => match other.index_text() {
                Some(text) => Value::Str(normalize_or_raw(normalizer, &text)),
                None => Value::Null,
            },
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(x) => Value::Float(*x),
        }
    }

    fn pattern_operand(&self, field: &str, pattern: &str) -> Value {
        let normalized = self
            .metadata
            .normalizer(field)
            .normalize_regex(pattern)
            .unwrap_or_else(|_| pattern.to_string());
        Value::Str(normalized)
    }
}

fn normalize_or_raw(normalizer: Normalizer, raw: &str) -> String {
    normalizer.normalize(raw).unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use quarry_planner::{FieldInfo, StaticMetadata};

    use super::*;

    fn metadata() -> Arc<dyn ShardMetadata> {
        Arc::new(
            StaticMetadata::builder()
                .field("COLOR", FieldInfo::indexed(Normalizer::LowerCase))
                .field("AGE", FieldInfo::indexed(Normalizer::Number))
                .field("NOTE", FieldInfo::stored(Normalizer::Verbatim))
                .build(),
        )
    }

    fn document() -> Document {
        let mut doc = Document::new();
        doc.put(ValueTuple::normalize("COLOR", "Red", Normalizer::LowerCase));
        doc.put(ValueTuple::normalize("COLOR", "Blue", Normalizer::LowerCase));
        doc.put(ValueTuple::normalize("AGE", "42", Normalizer::Number));
        doc.put(ValueTuple::new("NOTE", "hello world"));
        doc
    }

    #[test]
    fn test_comparisons() {
        let mut evaluator = Evaluator::new(metadata(), false);
        let doc = document();
        let cases = [
            (Expression::eq("COLOR", "RED"), true),
            (Expression::eq("COLOR", "green"), false),
            (Expression::ne("COLOR", "red"), false),
            (Expression::gt("AGE", 40i64), true),
            (Expression::lt("AGE", 40i64), false),
            (Expression::ge("AGE", "42"), true),
            (Expression::regex("NOTE", "hello.*"), true),
            (Expression::regex("COLOR", "B.*"), true),
            (Expression::not_regex("COLOR", "r.*"), false),
            (Expression::eq("MISSING", "x"), false),
        ];
        for (expr, expected) in cases {
            assert_eq!(evaluator.evaluate(&expr, &doc).unwrap(), expected, "{expr}");
        }
    }

    #[test]
    fn test_boolean_structure() {
        let mut evaluator = Evaluator::new(metadata(), false);
        let doc = document();
        let expr = Expression::and(vec![
            Expression::eq("COLOR", "red"),
            Expression::not(Expression::eq("COLOR", "green")),
        ]);
        assert!(evaluator.evaluate(&expr, &doc).unwrap());
        let expr = Expression::or(vec![
            Expression::eq("COLOR", "green"),
            Expression::exceeded_or_threshold("COLOR", ["blue", "pink"]),
        ]);
        assert!(evaluator.evaluate(&expr, &doc).unwrap());
        let expr = Expression::delayed(Expression::bounded_range(vec![
            Expression::ge("AGE", 40i64),
            Expression::le("AGE", 41i64),
        ]));
        assert!(!evaluator.evaluate(&expr, &doc).unwrap());
    }

    #[test]
    fn test_value_list_is_normalized() {
        let mut evaluator = Evaluator::new(metadata(), false);
        let doc = document();
        let list = Expression::exceeded_or_threshold("COLOR", ["GREEN", "RED"]);
        assert!(evaluator.evaluate(&Expression::eq("COLOR", "RED"), &doc).unwrap());
        assert!(evaluator.evaluate(&list, &doc).unwrap());
        let list = Expression::exceeded_or_threshold("AGE", ["7", "42"]);
        assert!(evaluator.evaluate(&list, &doc).unwrap());
    }

    #[test]
    fn test_hits_skip_negations() {
        let mut evaluator = Evaluator::new(metadata(), true);
        let doc = document();
        let expr = Expression::and(vec![
            Expression::eq("COLOR", "red"),
            Expression::not(Expression::eq("AGE", 7i64)),
        ]);
        assert!(evaluator.evaluate(&expr, &doc).unwrap());
        let hits = evaluator.take_hits();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].field, "COLOR");
        assert_eq!(hits[0].raw, "Red");
        assert!(evaluator.take_hits().is_empty());
    }
}
