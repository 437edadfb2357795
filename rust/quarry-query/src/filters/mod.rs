//! Key filters applied to every key a query reads.
//!
//! Filters are named in [`QueryOptions`](crate::QueryOptions) and created
//! through factories looked up in the global [`registry`]. The built-in
//! factories are `datatype`, `time-range` and `label`.

use std::{collections::BTreeMap, sync::Arc};

use quarry_common::Result;
use quarry_source::KeyFilter;

pub mod datatype;
pub mod label;
pub mod registry;
pub mod time_range;

pub use datatype::DatatypeFilter;
pub use label::{LabelExpression, LabelFilter};
pub use time_range::TimeRangeFilter;

/// Creates configured [`KeyFilter`]s of one kind.
pub trait IndexFilterFactory: Send + Sync + 'static {
    /// The name the factory is registered and referenced under.
    fn name(&self) -> &str;

    /// Builds a filter from its string options.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a missing or malformed option.
    fn create(&self, options: &BTreeMap<String, String>) -> Result<Arc<dyn KeyFilter>>;
}

/// Splits a comma separated option value, dropping blanks.
pub(crate) fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}
