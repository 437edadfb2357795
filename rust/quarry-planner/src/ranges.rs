use std::fmt;

use quarry_common::Result;
use quarry_source::{Key, PartialKey, Range};

use crate::{literal_range::LiteralRange, metadata::ShardMetadata, regex::RegexAnalyzer};

/// A comparison operator contributing one bound to a range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeOp {
    Lt,
    Le,
    Gt,
    Ge,
}

/// Collects `>`/`<` terms into one [`LiteralRange`] per field, in the order
/// fields are first encountered.
pub fn bounded_ranges<'a>(
    terms: impl IntoIterator<Item = (&'a str, RangeOp, &'a str)>,
) -> Vec<LiteralRange> {
    let mut ranges: Vec<LiteralRange> = Vec::new();
    for (field, op, value) in terms {
        let index = match ranges.iter().position(|r| r.field() == field) {
            Some(index) => index,
            None => {
                ranges.push(LiteralRange::new(field));
                ranges.len() - 1
            }
        };
        let range = &mut ranges[index];
        match op {
            RangeOp::Gt => range.update_lower(value, false),
            RangeOp::Ge => range.update_lower(value, true),
            RangeOp::Lt => range.update_upper(value, false),
            RangeOp::Le => range.update_upper(value, true),
        }
    }
    ranges
}

/// Where a pattern can be looked up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeDescription {
    /// Bounds over index values; for the reverse index, over reversed values.
    pub range: LiteralRange,
    pub for_reverse_index: bool,
}

impl fmt::Display for RangeDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.for_reverse_index {
            write!(f, "reverse {}", self.range)
        } else {
            write!(f, "forward {}", self.range)
        }
    }
}

/// Chooses the index range a pattern can be answered from.
///
/// A leading literal gives a forward-index prefix range. Otherwise a trailing
/// literal gives a reverse-index prefix range, provided the field is
/// reverse indexed (any field qualifies when `field` is `None`). Failing
/// both, a full scan of the field is used only if `full_table_scan` is set.
///
/// # Returns
///
/// `None` when the pattern cannot be resolved from the index.
pub fn regex_range(
    field: Option<&str>,
    pattern: &str,
    metadata: &dyn ShardMetadata,
    full_table_scan: bool,
) -> Result<Option<RangeDescription>> {
    let analyzer = RegexAnalyzer::new(pattern)?;
    let name = field.unwrap_or_default();
    if let Some(prefix) = analyzer.leading_literal() {
        return Ok(Some(RangeDescription {
            range: LiteralRange::for_prefix(name, prefix),
            for_reverse_index: false,
        }));
    }
    let reverse_available = field.is_none_or(|f| metadata.is_reverse_indexed(f));
    if let Some(suffix) = analyzer.trailing_literal() {
        if reverse_available {
            let reversed: String = suffix.chars().rev().collect();
            return Ok(Some(RangeDescription {
                range: LiteralRange::for_prefix(name, &reversed),
                for_reverse_index: true,
            }));
        }
    }
    if full_table_scan {
        return Ok(Some(RangeDescription {
            range: LiteralRange::new(name),
            for_reverse_index: false,
        }));
    }
    Ok(None)
}

/// The range of global index rows covering the values of `range`.
pub fn global_index_range(range: &LiteralRange) -> Range {
    let start = range.lower().map(|(value, inclusive)| {
        let key = Key::row_start(value);
        if inclusive {
            key
        } else {
            key.following_key(PartialKey::Row)
        }
    });
    let end = range.upper().map(|(value, inclusive)| {
        let key = Key::row_start(value);
        if inclusive {
            key.following_key(PartialKey::Row)
        } else {
            key
        }
    });
    Range::new(start, true, end, false)
}

#[cfg(test)]
mod tests {
    use quarry_arithmetic::Normalizer;

    use super::*;
    use crate::{FieldInfo, StaticMetadata};

    fn metadata() -> StaticMetadata {
        StaticMetadata::builder()
            .field("NAME", FieldInfo::indexed(Normalizer::LowerCase).reverse_indexed())
            .field("CITY", FieldInfo::indexed(Normalizer::LowerCase))
            .build()
    }

    #[test]
    fn test_bounded_ranges_per_field() {
        let ranges = bounded_ranges([
            ("AGE", RangeOp::Gt, "10"),
            ("HEIGHT", RangeOp::Le, "2"),
            ("AGE", RangeOp::Le, "20"),
        ]);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].field(), "AGE");
        assert!(ranges[0].is_bounded());
        assert!(!ranges[1].is_bounded());
    }

    #[test]
    fn test_regex_range_selection() {
        let md = metadata();
        let forward = regex_range(Some("NAME"), "ali.*", &md, false).unwrap().unwrap();
        assert!(!forward.for_reverse_index);
        assert_eq!(forward.range.lower(), Some(("ali", true)));

        let reverse = regex_range(Some("NAME"), ".*son", &md, false).unwrap().unwrap();
        assert!(reverse.for_reverse_index);
        assert_eq!(reverse.range.lower(), Some(("nos", true)));

        // No reverse index for CITY: only a full scan can help.
        assert_eq!(regex_range(Some("CITY"), ".*ton", &md, false).unwrap(), None);
        let full = regex_range(Some("CITY"), ".*ton", &md, true).unwrap().unwrap();
        assert!(!full.range.is_bounded() && !full.for_reverse_index);

        assert!(regex_range(Some("CITY"), "(", &md, true).is_err());
    }

    #[test]
    fn test_global_index_range() {
        let range = global_index_range(&LiteralRange::for_prefix("NAME", "al"));
        assert!(range.contains(&Key::new("al", "NAME", "shard\0csv")));
        assert!(range.contains(&Key::new("alice", "NAME", "shard\0csv")));
        assert!(!range.contains(&Key::new("am", "NAME", "shard\0csv")));
        assert!(!range.contains(&Key::new("ak", "NAME", "shard\0csv")));
    }
}
