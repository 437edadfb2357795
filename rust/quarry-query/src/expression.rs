//! The parsed boolean query a shard evaluates.
//!
//! Leaves compare one field against a literal or a pattern. Marker nodes
//! (`BoundedRange`, `ExceededValueThreshold`, `ExceededOrThreshold`,
//! `Delayed`) are attached by upstream planning and tell the compiler how a
//! subtree may be executed; they never change what the subtree means.

use std::{collections::BTreeSet, fmt};

use quarry_common::{Result, error::Error};
use serde::{Deserialize, Serialize};

/// A literal operand of a comparison.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Literal {
    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }

    /// The literal as it would be written into an index value, before
    /// normalization. `None` for null.
    pub fn index_text(&self) -> Option<String> {
        match self {
            Literal::Null => None,
            Literal::Bool(b) => Some(b.to_string()),
            Literal::Int(i) => Some(i.to_string()),
            Literal::Float(f) => Some(f.to_string()),
            Literal::Str(s) => Some(s.clone()),
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Str(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Str(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Int(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("null"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(x) => write!(f, "{x}"),
            Literal::Str(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Expression {
    And {
        children: Vec<Expression>,
    },
    Or {
        children: Vec<Expression>,
    },
    Not {
        child: Box<Expression>,
    },
    Eq {
        field: String,
        value: Literal,
    },
    Ne {
        field: String,
        value: Literal,
    },
    Lt {
        field: String,
        value: Literal,
    },
    Le {
        field: String,
        value: Literal,
    },
    Gt {
        field: String,
        value: Literal,
    },
    Ge {
        field: String,
        value: Literal,
    },
    Regex {
        field: String,
        pattern: String,
    },
    NotRegex {
        field: String,
        pattern: String,
    },
    /// A conjunction of comparisons forming one closed range on one field.
    BoundedRange {
        children: Vec<Expression>,
    },
    /// A regex or bounded range known to match too many values to expand.
    ExceededValueThreshold {
        child: Box<Expression>,
    },
    /// An equality against more values than an OR of terms should carry.
    ExceededOrThreshold {
        field: String,
        values: Vec<String>,
    },
    /// A predicate evaluated only against fetched documents.
    Delayed {
        child: Box<Expression>,
    },
}

impl Expression {
    pub fn and(children: impl IntoIterator<Item = Expression>) -> Expression {
        Expression::And {
            children: children.into_iter().collect(),
        }
    }

    pub fn or(children: impl IntoIterator<Item = Expression>) -> Expression {
        Expression::Or {
            children: children.into_iter().collect(),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: Expression) -> Expression {
        Expression::Not {
            child: Box::new(child),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Literal>) -> Expression {
        Expression::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Literal>) -> Expression {
        Expression::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Literal>) -> Expression {
        Expression::Lt {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn le(field: impl Into<String>, value: impl Into<Literal>) -> Expression {
        Expression::Le {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Literal>) -> Expression {
        Expression::Gt {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Literal>) -> Expression {
        Expression::Ge {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn regex(field: impl Into<String>, pattern: impl Into<String>) -> Expression {
        Expression::Regex {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    pub fn not_regex(field: impl Into<String>, pattern: impl Into<String>) -> Expression {
        Expression::NotRegex {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    pub fn bounded_range(children: impl IntoIterator<Item = Expression>) -> Expression {
        Expression::BoundedRange {
            children: children.into_iter().collect(),
        }
    }

    pub fn exceeded_value_threshold(child: Expression) -> Expression {
        Expression::ExceededValueThreshold {
            child: Box::new(child),
        }
    }

    pub fn exceeded_or_threshold(
        field: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Expression {
        Expression::ExceededOrThreshold {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn delayed(child: Expression) -> Expression {
        Expression::Delayed {
            child: Box::new(child),
        }
    }

    /// Parses the JSON form, e.g.
    /// `{"op": "eq", "field": "COLOR", "value": "red"}`.
    pub fn from_json(json: &str) -> Result<Expression> {
        serde_json::from_str(json).map_err(|e| Error::serialization("expression json", e))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::serialization("expression json", e))
    }

    /// The field a single-field node refers to.
    pub fn field(&self) -> Option<&str> {
        match self {
            Expression::Eq { field, .. }
            | Expression::Ne { field, .. }
            | Expression::Lt { field, .. }
            | Expression::Le { field, .. }
            | Expression::Gt { field, .. }
            | Expression::Ge { field, .. }
            | Expression::Regex { field, .. }
            | Expression::NotRegex { field, .. }
            | Expression::ExceededOrThreshold { field, .. } => Some(field),
            Expression::BoundedRange { children } => children.first().and_then(Expression::field),
            Expression::ExceededValueThreshold { child } | Expression::Delayed { child } => {
                child.field()
            }
            Expression::And { .. } | Expression::Or { .. } | Expression::Not { .. } => None,
        }
    }

    /// Every field the expression refers to.
    pub fn fields(&self) -> BTreeSet<&str> {
        let mut fields = BTreeSet::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields<'a>(&'a self, fields: &mut BTreeSet<&'a str>) {
        match self {
            Expression::And { children }
            | Expression::Or { children }
            | Expression::BoundedRange { children } => {
                for child in children {
                    child.collect_fields(fields);
                }
            }
            Expression::Not { child }
            | Expression::ExceededValueThreshold { child }
            | Expression::Delayed { child } => child.collect_fields(fields),
            leaf => {
                if let Some(field) = leaf.field() {
                    fields.insert(field);
                }
            }
        }
    }

    pub fn is_negation(&self) -> bool {
        matches!(
            self,
            Expression::Not { .. } | Expression::Ne { .. } | Expression::NotRegex { .. }
        )
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, children: &[Expression], op: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, " {op} ")?;
        }
        write!(f, "{child}")?;
    }
    f.write_str(")")
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::And { children } => write_joined(f, children, "&&"),
            Expression::Or { children } => write_joined(f, children, "||"),
            Expression::Not { child } => write!(f, "!{child}"),
            Expression::Eq { field, value } => write!(f, "{field} == {value}"),
            Expression::Ne { field, value } => write!(f, "{field} != {value}"),
            Expression::Lt { field, value } => write!(f, "{field} < {value}"),
            Expression::Le { field, value } => write!(f, "{field} <= {value}"),
            Expression::Gt { field, value } => write!(f, "{field} > {value}"),
            Expression::Ge { field, value } => write!(f, "{field} >= {value}"),
            Expression::Regex { field, pattern } => write!(f, "{field} =~ '{pattern}'"),
            Expression::NotRegex { field, pattern } => write!(f, "{field} !~ '{pattern}'"),
            Expression::BoundedRange { children } => {
                f.write_str("bounded")?;
                write_joined(f, children, "&&")
            }
            Expression::ExceededValueThreshold { child } => write!(f, "exceeded_value({child})"),
            Expression::ExceededOrThreshold { field, values } => {
                write!(f, "{field} in {values:?}")
            }
            Expression::Delayed { child } => write!(f, "delayed({child})"),
        }
    }
}
