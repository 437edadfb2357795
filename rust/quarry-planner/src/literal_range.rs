use std::fmt;

use quarry_source::{MAX_UNICODE, Range, field_index};

/// A lower/upper bound pair over the values of one field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiteralRange {
    field: String,
    lower: Option<String>,
    lower_inclusive: bool,
    upper: Option<String>,
    upper_inclusive: bool,
}

impl LiteralRange {
    /// An unbounded range over every value of `field`.
    pub fn new(field: impl Into<String>) -> LiteralRange {
        LiteralRange {
            field: field.into(),
            lower: None,
            lower_inclusive: true,
            upper: None,
            upper_inclusive: true,
        }
    }

    /// All values starting with `prefix`: `[prefix, prefix + U+10FFFF]`.
    pub fn for_prefix(field: impl Into<String>, prefix: &str) -> LiteralRange {
        let mut range = LiteralRange::new(field);
        range.update_lower(prefix, true);
        range.update_upper(&format!("{prefix}{MAX_UNICODE}"), true);
        range
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn lower(&self) -> Option<(&str, bool)> {
        self.lower.as_deref().map(|l| (l, self.lower_inclusive))
    }

    pub fn upper(&self) -> Option<(&str, bool)> {
        self.upper.as_deref().map(|u| (u, self.upper_inclusive))
    }

    /// Tightens the lower bound; a looser bound is ignored.
    pub fn update_lower(&mut self, value: &str, inclusive: bool) {
        let tighter = match self.lower.as_deref() {
            None => true,
            Some(current) => value > current || (value == current && !inclusive),
        };
        if tighter {
            self.lower = Some(value.to_string());
            self.lower_inclusive = inclusive;
        }
    }

    /// Tightens the upper bound; a looser bound is ignored.
    pub fn update_upper(&mut self, value: &str, inclusive: bool) {
        let tighter = match self.upper.as_deref() {
            None => true,
            Some(current) => value < current || (value == current && !inclusive),
        };
        if tighter {
            self.upper = Some(value.to_string());
            self.upper_inclusive = inclusive;
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.lower.is_some() && self.upper.is_some()
    }

    /// True when no value can satisfy both bounds.
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Some(l), Some(u)) => l > u || (l == u && !(self.lower_inclusive && self.upper_inclusive)),
            _ => false,
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        let above = match self.lower.as_deref() {
            None => true,
            Some(l) if self.lower_inclusive => value >= l,
            Some(l) => value > l,
        };
        let below = match self.upper.as_deref() {
            None => true,
            Some(u) if self.upper_inclusive => value <= u,
            Some(u) => value < u,
        };
        above && below
    }

    /// The field-index scan range of this literal range within `row`.
    pub fn field_index_range(&self, row: &str) -> Range {
        field_index::value_range(row, &self.field, self.lower(), self.upper())
    }
}

impl fmt::Display for LiteralRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((lower, inclusive)) = self.lower() {
            write!(f, "{lower:?} {} ", if inclusive { "<=" } else { "<" })?;
        }
        f.write_str(&self.field)?;
        if let Some((upper, inclusive)) = self.upper() {
            write!(f, " {} {upper:?}", if inclusive { "<=" } else { "<" })?;
        }
        Ok(())
    }
}
