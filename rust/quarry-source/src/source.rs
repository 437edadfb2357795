//! The cursor protocol every index and document scan is written against.

use quarry_common::Result;

use crate::{key::Key, range::Range};

/// A forward-only cursor over a sorted key-value store.
///
/// Construction plays the role of initialization; a fresh source has no top
/// until [`seek`](Self::seek) is called. Implementations must yield keys in
/// [`Key`] order and never outside the last seek range.
pub trait SortedSource: Send {
    /// Positions the cursor on the first key in `range` that passes the
    /// column family filter.
    ///
    /// With `inclusive == true` only the listed families are returned (an
    /// empty list returns nothing); with `inclusive == false` the listed
    /// families are skipped (an empty list returns everything).
    fn seek(&mut self, range: &Range, families: &[String], inclusive: bool) -> Result<()>;

    fn has_top(&self) -> bool;

    fn top_key(&self) -> Option<&Key>;

    fn top_value(&self) -> Option<&[u8]>;

    /// Advances to the next key within the seek range.
    fn next(&mut self) -> Result<()>;

    /// Returns an independently positioned cursor over the same data.
    fn deep_copy(&self) -> Box<dyn SortedSource>;
}

/// A source without keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptySource;

impl SortedSource for EmptySource {
    fn seek(&mut self, _range: &Range, _families: &[String], _inclusive: bool) -> Result<()> {
        Ok(())
    }

    fn has_top(&self) -> bool {
        false
    }

    fn top_key(&self) -> Option<&Key> {
        None
    }

    fn top_value(&self) -> Option<&[u8]> {
        None
    }

    fn next(&mut self) -> Result<()> {
        Err(quarry_common::error::Error::invalid_operation(
            "next on empty source",
        ))
    }

    fn deep_copy(&self) -> Box<dyn SortedSource> {
        Box::new(EmptySource)
    }
}
