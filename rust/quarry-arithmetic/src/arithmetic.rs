//! Existential comparison operators over multi-valued operands.
//!
//! Equality and relational operators compare normalized values only. Pattern
//! matching sees both the normalized and the raw form of every tuple. Either
//! side may be a set; the operator holds if any element pair satisfies it.

use std::{cmp::Ordering, sync::Arc};

use quarry_common::{Result, error::Error};

use crate::{
    pattern::PatternCache,
    value::{Operand, Scalar, Value, ValueTuple, all_operands, normalized_operands},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Relation {
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl Relation {
    fn holds(self, ord: Ordering) -> bool {
        match self {
            Relation::Less => ord == Ordering::Less,
            Relation::LessOrEqual => ord != Ordering::Greater,
            Relation::Greater => ord == Ordering::Greater,
            Relation::GreaterOrEqual => ord != Ordering::Less,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

/// Evaluates comparison operators, optionally recording which document
/// values satisfied them.
///
/// In strict mode a comparison involving null, or a string that cannot be
/// coerced to a number, is an error. The default lenient mode treats both as
/// "does not hold" so that fields absent from a document need no special
/// handling in the expression.
#[derive(Debug)]
pub struct Arithmetic {
    strict: bool,
    hits: Option<Vec<ValueTuple>>,
    patterns: Arc<PatternCache>,
}

impl Arithmetic {
    pub fn new() -> Arithmetic {
        Arithmetic {
            strict: false,
            hits: None,
            patterns: Arc::new(PatternCache::default()),
        }
    }

    pub fn strict() -> Arithmetic {
        Arithmetic {
            strict: true,
            ..Arithmetic::new()
        }
    }

    /// Enables hit list recording.
    pub fn with_hit_list(mut self) -> Arithmetic {
        self.hits = Some(Vec::new());
        self
    }

    /// Shares a pattern cache with other evaluators.
    pub fn with_pattern_cache(mut self, patterns: Arc<PatternCache>) -> Arithmetic {
        self.patterns = patterns;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn is_hit_list(&self) -> bool {
        self.hits.is_some()
    }

    /// Tuples that satisfied a non-negated operator so far, in discovery
    /// order and without duplicates.
    pub fn hits(&self) -> &[ValueTuple] {
        self.hits.as_deref().unwrap_or(&[])
    }

    /// Returns the recorded hits and starts a fresh list.
    pub fn take_hits(&mut self) -> Vec<ValueTuple> {
        match self.hits.as_mut() {
            Some(hits) => std::mem::take(hits),
            None => Vec::new(),
        }
    }

    pub fn equals(&mut self, left: &Value, right: &Value) -> Result<bool> {
        self.any_pair(
            &normalized_operands(left),
            &normalized_operands(right),
            true,
            |a, l, r| a.scalar_equals(l, r),
        )
    }

    pub fn not_equals(&mut self, left: &Value, right: &Value) -> Result<bool> {
        let equal = self.any_pair(
            &normalized_operands(left),
            &normalized_operands(right),
            false,
            |a, l, r| a.scalar_equals(l, r),
        )?;
        Ok(!equal)
    }

    pub fn less_than(&mut self, left: &Value, right: &Value) -> Result<bool> {
        self.relation(left, right, Relation::Less)
    }

    pub fn less_than_or_equal(&mut self, left: &Value, right: &Value) -> Result<bool> {
        self.relation(left, right, Relation::LessOrEqual)
    }

    pub fn greater_than(&mut self, left: &Value, right: &Value) -> Result<bool> {
        self.relation(left, right, Relation::Greater)
    }

    pub fn greater_than_or_equal(&mut self, left: &Value, right: &Value) -> Result<bool> {
        self.relation(left, right, Relation::GreaterOrEqual)
    }

    /// True if any value of `left` (normalized or raw) fully matches any
    /// pattern in `right`.
    pub fn matches(&mut self, left: &Value, right: &Value) -> Result<bool> {
        self.pattern_match(left, right, true)
    }

    pub fn not_matches(&mut self, left: &Value, right: &Value) -> Result<bool> {
        Ok(!self.pattern_match(left, right, false)?)
    }

    fn pattern_match(&mut self, left: &Value, right: &Value, record: bool) -> Result<bool> {
        let elements = all_operands(left);
        let patterns = normalized_operands(right);
        let both_null = elements.iter().all(|o| o.scalar == Scalar::Null)
            && patterns.iter().all(|o| o.scalar == Scalar::Null);
        if both_null && !elements.is_empty() && !patterns.is_empty() {
            return Ok(true);
        }
        self.any_pair(&elements, &patterns, record, |a, element, pattern| {
            let (Some(text), Some(pattern)) = (element.text(), pattern.text()) else {
                return Ok(false);
            };
            Ok(a.patterns.get(&pattern)?.is_match(&text))
        })
    }

    fn relation(&mut self, left: &Value, right: &Value, relation: Relation) -> Result<bool> {
        self.any_pair(
            &normalized_operands(left),
            &normalized_operands(right),
            true,
            |a, l, r| Ok(a.scalar_compare(l, r)?.is_some_and(|ord| relation.holds(ord))),
        )
    }

    /// Existential lifting of a scalar predicate. Without a hit list the
    /// search stops at the first satisfying pair; with one, every pair is
    /// visited so that all contributing tuples are recorded.
    fn any_pair<'v>(
        &mut self,
        left: &[Operand<'v>],
        right: &[Operand<'v>],
        record: bool,
        predicate: impl Fn(&Arithmetic, Scalar<'v>, Scalar<'v>) -> Result<bool>,
    ) -> Result<bool> {
        let record = record && self.hits.is_some();
        let mut found = false;
        for l in left {
            for r in right {
                if !predicate(self, l.scalar, r.scalar)? {
                    continue;
                }
                found = true;
                if !record {
                    return Ok(true);
                }
                self.record(l.tuple);
                self.record(r.tuple);
            }
        }
        Ok(found)
    }

    fn record(&mut self, tuple: Option<&ValueTuple>) {
        if let (Some(hits), Some(tuple)) = (self.hits.as_mut(), tuple) {
            if !hits.iter().any(|h| h.same_value(tuple)) {
                hits.push(tuple.clone());
            }
        }
    }

    fn scalar_equals(&self, left: Scalar, right: Scalar) -> Result<bool> {
        match (left, right) {
            (Scalar::Null, Scalar::Null) => Ok(true),
            (Scalar::Null, _) | (_, Scalar::Null) => Ok(false),
            (Scalar::Str(a), Scalar::Str(b)) => Ok(a == b),
            (l, r) => match (self.to_number(l), self.to_number(r)) {
                (Ok(a), Ok(b)) => Ok(a.compare(b) == Some(Ordering::Equal)),
                (Err(e), _) | (_, Err(e)) if self.strict => Err(e),
                // Last resort: compare the textual forms.
                _ => Ok(l.text() == r.text()),
            },
        }
    }

    fn scalar_compare(&self, left: Scalar, right: Scalar) -> Result<Option<Ordering>> {
        match (left, right) {
            (Scalar::Null, _) | (_, Scalar::Null) => {
                if self.strict {
                    Err(Error::arithmetic("relational comparison with null"))
                } else {
                    Ok(None)
                }
            }
            (Scalar::Str(a), Scalar::Str(b)) => Ok(Some(a.cmp(b))),
            (l, r) => match (self.to_number(l), self.to_number(r)) {
                (Ok(a), Ok(b)) => Ok(a.compare(b)),
                (Err(e), _) | (_, Err(e)) if self.strict => Err(e),
                _ => Ok(None),
            },
        }
    }

    fn to_number(&self, scalar: Scalar) -> Result<Number> {
        match scalar {
            Scalar::Int(i) => Ok(Number::Int(i)),
            Scalar::Float(f) => Ok(Number::Float(f)),
            Scalar::Bool(b) => Ok(Number::Int(b as i64)),
            Scalar::Char(c) => Ok(Number::Int(c as i64)),
            Scalar::Str(s) => {
                let text = s.trim();
                if let Ok(i) = text.parse::<i64>() {
                    return Ok(Number::Int(i));
                }
                text.parse::<f64>()
                    .map(Number::Float)
                    .map_err(|_| Error::arithmetic(format!("cannot coerce {s:?} to a number")))
            }
            Scalar::Null => Err(Error::arithmetic("cannot coerce null to a number")),
        }
    }
}

impl Default for Arithmetic {
    fn default() -> Self {
        Arithmetic::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(field: &str, raw: &str) -> Value {
        Value::Tuple(ValueTuple::new(field, raw))
    }

    #[test]
    fn test_equals_is_existential() {
        let mut a = Arithmetic::new();
        assert!(a.equals(&Value::set(["a", "b"]), &Value::from("b")).unwrap());
        assert!(!a.equals(&Value::set(["a", "c"]), &Value::from("b")).unwrap());
        assert!(a.equals(&Value::from("b"), &Value::set(["x", "b"])).unwrap());
        assert!(
            a.equals(&Value::set(["x", "y"]), &Value::set(["z", "y"]))
                .unwrap()
        );
        assert!(!a.equals(&Value::Set(vec![]), &Value::from("b")).unwrap());
    }

    #[test]
    fn test_not_equals_negates_equals() {
        let mut a = Arithmetic::new();
        assert!(!a.not_equals(&Value::set(["a", "b"]), &Value::from("b")).unwrap());
        assert!(a.not_equals(&Value::set(["a", "c"]), &Value::from("b")).unwrap());
    }

    #[test]
    fn test_normalized_form_used_for_equality() {
        let mut a = Arithmetic::new();
        let stored = Value::Tuple(ValueTuple::new("NAME", "Bob").with_normalized("bob"));
        assert!(a.equals(&stored, &Value::from("bob")).unwrap());
        assert!(!a.equals(&stored, &Value::from("Bob")).unwrap());
        // Pattern matching also sees the raw form.
        assert!(a.matches(&stored, &Value::from("B.*")).unwrap());
    }

    #[test]
    fn test_numeric_coercion() {
        let mut a = Arithmetic::new();
        assert!(a.equals(&Value::from("10"), &Value::Int(10)).unwrap());
        assert!(a.equals(&Value::from("2.5"), &Value::Float(2.5)).unwrap());
        assert!(a.equals(&Value::Bool(true), &Value::Int(1)).unwrap());
        assert!(a.equals(&Value::Char('A'), &Value::Int(65)).unwrap());
        assert!(a.less_than(&Value::from("9"), &Value::Int(10)).unwrap());
        // Two strings compare as text.
        assert!(!a.less_than(&Value::from("9"), &Value::from("10")).unwrap());
        assert!(!a.equals(&Value::from("ten"), &Value::Int(10)).unwrap());
        assert!(!a.less_than(&Value::from("ten"), &Value::Int(10)).unwrap());

        let mut strict = Arithmetic::strict();
        assert!(strict.equals(&Value::from("ten"), &Value::Int(10)).is_err());
        assert!(strict.less_than(&Value::Null, &Value::Int(10)).is_err());
    }

    #[test]
    fn test_relational_is_existential() {
        let mut a = Arithmetic::new();
        let ages = Value::set([Value::Int(5), Value::Int(50)]);
        assert!(a.greater_than(&ages, &Value::Int(40)).unwrap());
        assert!(a.less_than(&ages, &Value::Int(10)).unwrap());
        assert!(!a.greater_than(&ages, &Value::Int(50)).unwrap());
        assert!(a.greater_than_or_equal(&ages, &Value::Int(50)).unwrap());
        assert!(a.less_than_or_equal(&ages, &Value::Int(5)).unwrap());
        assert!(!a.less_than(&Value::Null, &Value::Int(10)).unwrap());
    }

    #[test]
    fn test_null_handling() {
        let mut a = Arithmetic::new();
        assert!(a.equals(&Value::Null, &Value::Null).unwrap());
        assert!(!a.equals(&Value::Null, &Value::from("x")).unwrap());
        assert!(a.not_equals(&Value::Null, &Value::from("x")).unwrap());
        assert!(a.matches(&Value::Null, &Value::Null).unwrap());
        assert!(!a.matches(&Value::Null, &Value::from(".*")).unwrap());
    }

    #[test]
    fn test_matches_any_element_any_pattern() {
        let mut a = Arithmetic::new();
        let pattern = Value::from("f.*");
        assert!(a.matches(&Value::set(["foo", "bar"]), &pattern).unwrap());
        assert!(!a.matches(&Value::set(["baz"]), &pattern).unwrap());
        assert!(
            a.matches(&Value::from("baz"), &Value::set(["q.*", "b.z"]))
                .unwrap()
        );
        assert!(a.not_matches(&Value::set(["baz"]), &pattern).unwrap());
        assert!(a.matches(&Value::from("a\nb"), &Value::from("a.b")).unwrap());
        assert!(a.matches(&Value::from("x"), &Value::from("(")).is_err());
    }

    #[test]
    fn test_hit_list_records_all_satisfying_tuples() {
        let mut a = Arithmetic::new().with_hit_list();
        let colors = Value::set([tuple("COLOR", "red"), tuple("COLOR", "blue"), tuple("COLOR", "rose")]);
        assert!(a.matches(&colors, &Value::from("r.*")).unwrap());
        assert!(a.equals(&colors, &Value::from("red")).unwrap());
        let hits: Vec<&str> = a.hits().iter().map(|t| t.raw.as_str()).collect();
        assert_eq!(hits, vec!["red", "rose"]);

        // Negated operators never contribute hits.
        assert!(a.not_equals(&colors, &Value::from("green")).unwrap());
        assert_eq!(a.take_hits().len(), 2);
        assert!(a.hits().is_empty());
        assert!(a.is_hit_list());
    }
}
