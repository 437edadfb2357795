use std::fmt;

use crate::key::{Key, PartialKey};

/// A span of keys with optional, independently inclusive bounds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Range {
    start: Option<Key>,
    start_inclusive: bool,
    end: Option<Key>,
    end_inclusive: bool,
}

impl Range {
    pub fn new(
        start: Option<Key>,
        start_inclusive: bool,
        end: Option<Key>,
        end_inclusive: bool,
    ) -> Range {
        Range {
            start,
            start_inclusive,
            end,
            end_inclusive,
        }
    }

    /// The whole key space.
    pub fn all() -> Range {
        Range::new(None, true, None, true)
    }

    /// Every key of one row.
    pub fn exact_row(row: &str) -> Range {
        let start = Key::row_start(row);
        let end = start.following_key(PartialKey::Row);
        Range::new(Some(start), true, Some(end), false)
    }

    /// Every row from `start_row` through `end_row`, both inclusive.
    pub fn rows(start_row: &str, end_row: &str) -> Range {
        let end = Key::row_start(end_row).following_key(PartialKey::Row);
        Range::new(Some(Key::row_start(start_row)), true, Some(end), false)
    }

    /// Every key of `(row, family)`.
    pub fn exact_family(row: &str, family: &str) -> Range {
        let start = Key::new(row, family, "");
        let end = start.following_key(PartialKey::RowFamily);
        Range::new(Some(start), true, Some(end), false)
    }

    /// Every key of `(row, family)` whose qualifier starts with `prefix`.
    pub fn qualifier_prefix(row: &str, family: &str, prefix: &str) -> Range {
        let start = Key::new(row, family, prefix);
        let mut upper = String::with_capacity(prefix.len() + 4);
        upper.push_str(prefix);
        upper.push(crate::MAX_UNICODE);
        let end = Key::new(row, family, upper);
        Range::new(Some(start), true, Some(end), false)
    }

    pub fn start(&self) -> Option<&Key> {
        self.start.as_ref()
    }

    pub fn end(&self) -> Option<&Key> {
        self.end.as_ref()
    }

    pub fn is_start_inclusive(&self) -> bool {
        self.start_inclusive
    }

    pub fn is_end_inclusive(&self) -> bool {
        self.end_inclusive
    }

    /// True when `key` sorts before the start of this range.
    pub fn before_start(&self, key: &Key) -> bool {
        match &self.start {
            None => false,
            Some(start) if self.start_inclusive => key < start,
            Some(start) => key <= start,
        }
    }

    /// True when `key` sorts after the end of this range.
    pub fn after_end(&self, key: &Key) -> bool {
        match &self.end {
            None => false,
            Some(end) if self.end_inclusive => key > end,
            Some(end) => key >= end,
        }
    }

    pub fn contains(&self, key: &Key) -> bool {
        !self.before_start(key) && !self.after_end(key)
    }

    /// Returns this range with its start moved forward to `key` (inclusive),
    /// unless the current start is already past it.
    pub fn clip_start(&self, key: &Key) -> Range {
        if self.before_start(key) {
            return self.clone();
        }
        Range::new(Some(key.clone()), true, self.end.clone(), self.end_inclusive)
    }

    /// True when no key can satisfy both bounds.
    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Some(start), Some(end)) => {
                start > end || (start == end && !(self.start_inclusive && self.end_inclusive))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = if self.start_inclusive { '[' } else { '(' };
        let close = if self.end_inclusive { ']' } else { ')' };
        match &self.start {
            Some(k) => write!(f, "{open}{k}")?,
            None => write!(f, "{open}-inf")?,
        }
        match &self.end {
            Some(k) => write!(f, ", {k}{close}"),
            None => write!(f, ", +inf{close}"),
        }
    }
}
