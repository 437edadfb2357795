//! The nested iterator tree: lazy, sorted streams of candidate documents.
//!
//! Leaves read field-index postings (directly, from a materialized list, or
//! from an ivarator's external sorted set); [`AndIterator`] and
//! [`OrIterator`] merge their children's sorted streams by
//! [`DocumentKey`](quarry_source::DocumentKey). Negation is not a node: an
//! AND carries excluded children that filter, but never drive, iteration.

pub mod and;
pub mod index;
pub mod iterator;
pub mod list;
pub mod or;
pub mod posting;
pub mod scan;
pub mod set;
pub mod unsorted;

pub use and::AndIterator;
pub use index::IndexIterator;
pub use iterator::{NestedIterator, describe_tree};
pub use list::SortedListIterator;
pub use or::OrIterator;
pub use posting::FieldPosting;
pub use scan::DocumentScanIterator;
pub use set::SortedSetIterator;
pub use unsorted::{UnsortedIterator, UnsortedOrIterator, ValueMatcher};

/// Default number of `next` calls tried before a leaf seeks instead.
pub const DEFAULT_SEEK_THRESHOLD: usize = 10;
