use std::fmt;

use quarry_source::Key;
use serde::{Deserialize, Serialize};

use crate::normalizer::Normalizer;

/// One value of one field: the raw form as stored, the normalized form used
/// for index lookups and comparisons, and the key it was read from.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValueTuple {
    pub field: String,
    pub raw: String,
    #[serde(default)]
    pub normalized: Option<String>,
    #[serde(default)]
    pub source: Option<Key>,
}

impl ValueTuple {
    /// A tuple with no normalized form; comparisons use the raw value.
    pub fn new(field: impl Into<String>, raw: impl Into<String>) -> ValueTuple {
        ValueTuple {
            field: field.into(),
            raw: raw.into(),
            normalized: None,
            source: None,
        }
    }

    /// Normalizes `raw` with `normalizer`. A value the normalizer rejects is
    /// kept with its raw form only.
    pub fn normalize(
        field: impl Into<String>,
        raw: impl Into<String>,
        normalizer: Normalizer,
    ) -> ValueTuple {
        let field = field.into();
        let raw = raw.into();
        let normalized = match normalizer.normalize(&raw) {
            Ok(normalized) => Some(normalized),
            Err(e) => {
                log::debug!("keeping raw value of {field}: {e}");
                None
            }
        };
        ValueTuple {
            field,
            raw,
            normalized,
            source: None,
        }
    }

    pub fn with_normalized(mut self, normalized: impl Into<String>) -> ValueTuple {
        self.normalized = Some(normalized.into());
        self
    }

    pub fn with_source(mut self, source: Key) -> ValueTuple {
        self.source = Some(source);
        self
    }

    /// The normalized form, falling back to the raw value.
    pub fn normalized_value(&self) -> &str {
        self.normalized.as_deref().unwrap_or(&self.raw)
    }

    /// True when both tuples carry the same field and value forms, regardless
    /// of where they were read from.
    pub fn same_value(&self, other: &ValueTuple) -> bool {
        self.field == other.field && self.raw == other.raw && self.normalized == other.normalized
    }
}

impl fmt::Display for ValueTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.normalized {
            Some(n) if n != &self.raw => write!(f, "{}={} ({})", self.field, self.raw, n),
            _ => write!(f, "{}={}", self.field, self.raw),
        }
    }
}

/// An operand of the multi-valued arithmetic.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Char(char),
    Int(i64),
    Float(f64),
    Str(String),
    Tuple(ValueTuple),
    /// All values one field carries in a document, or a list of query
    /// literals.
    Set(Vec<Value>),
}

impl Value {
    pub fn set(values: impl IntoIterator<Item = impl Into<Value>>) -> Value {
        Value::Set(values.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Renders a scalar the way a pattern sees it.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null | Value::Set(_) => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Char(c) => Some(c.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Str(s) => Some(s.clone()),
            Value::Tuple(t) => Some(t.normalized_value().to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Char(c)
    }
}

impl From<ValueTuple> for Value {
    fn from(t: ValueTuple) -> Self {
        Value::Tuple(t)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::Set(values)
    }
}

/// A scalar view of one set element, with the tuple it came from.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Operand<'a> {
    pub scalar: Scalar<'a>,
    pub tuple: Option<&'a ValueTuple>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Scalar<'a> {
    Null,
    Bool(bool),
    Char(char),
    Int(i64),
    Float(f64),
    Str(&'a str),
}

impl Scalar<'_> {
    pub fn text(&self) -> Option<String> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(b) => Some(b.to_string()),
            Scalar::Char(c) => Some(c.to_string()),
            Scalar::Int(i) => Some(i.to_string()),
            Scalar::Float(f) => Some(f.to_string()),
            Scalar::Str(s) => Some((*s).to_string()),
        }
    }
}

impl<'a> Operand<'a> {
    fn plain(scalar: Scalar<'a>) -> Operand<'a> {
        Operand {
            scalar,
            tuple: None,
        }
    }
}

/// Flattens `value` into operands using normalized forms only.
pub(crate) fn normalized_operands(value: &Value) -> Vec<Operand<'_>> {
    let mut out = Vec::new();
    collect(value, false, &mut out);
    out
}

/// Flattens `value` into operands using both normalized and raw forms.
pub(crate) fn all_operands(value: &Value) -> Vec<Operand<'_>> {
    let mut out = Vec::new();
    collect(value, true, &mut out);
    out
}

fn collect<'a>(value: &'a Value, with_raw: bool, out: &mut Vec<Operand<'a>>) {
    match value {
        Value::Null => out.push(Operand::plain(Scalar::Null)),
        Value::Bool(b) => out.push(Operand::plain(Scalar::Bool(*b))),
        Value::Char(c) => out.push(Operand::plain(Scalar::Char(*c))),
        Value::Int(i) => out.push(Operand::plain(Scalar::Int(*i))),
        Value::Float(f) => out.push(Operand::plain(Scalar::Float(*f))),
        Value::Str(s) => out.push(Operand::plain(Scalar::Str(s))),
        Value::Tuple(t) => {
            out.push(Operand {
                scalar: Scalar::Str(t.normalized_value()),
                tuple: Some(t),
            });
            if with_raw && t.normalized.as_deref().is_some_and(|n| n != t.raw) {
                out.push(Operand {
                    scalar: Scalar::Str(&t.raw),
                    tuple: Some(t),
                });
            }
        }
        Value::Set(values) => {
            for v in values {
                collect(v, with_raw, out);
            }
        }
    }
}
