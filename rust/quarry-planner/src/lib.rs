//! Index range planning: turning terms, comparisons and patterns into scan
//! ranges over the shard field index or the global term index, and bounded
//! term expansion for patterns.

pub mod literal_range;
pub mod lookup;
pub mod metadata;
pub mod ranges;
pub mod regex;

pub use literal_range::LiteralRange;
pub use lookup::{IndexLookupMap, LookupOptions, ValueSet, lookup_terms_from_regex};
pub use metadata::{FieldInfo, ShardMetadata, StaticMetadata};
pub use ranges::{RangeDescription, RangeOp, bounded_ranges, regex_range};
pub use regex::RegexAnalyzer;
