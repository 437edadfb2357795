//! Consumer-side model of the sorted key-value store a shard lives in.
//!
//! The store itself is external; this crate defines the composite [`Key`],
//! scan [`Range`]s, the [`SortedSource`] cursor protocol every iterator is
//! written against, the key layouts used by the field index and stored
//! documents, and an in-memory source used by tools and tests.

pub mod document;
pub mod field_index;
pub mod filter;
pub mod key;
pub mod memory;
pub mod pool;
pub mod range;
pub mod source;

pub use document::{DocumentKey, DocumentPointer};
pub use filter::{FilterChain, KeyFilter};
pub use key::{Key, PartialKey};
pub use memory::MemorySource;
pub use pool::{PooledSource, SourceFactory, SourcePool};
pub use range::Range;
pub use source::{EmptySource, SortedSource};

/// Field separator used inside families and qualifiers.
pub const NULL_DELIMITER: char = '\0';

/// Largest code point; appended to a prefix to build an inclusive upper bound.
pub const MAX_UNICODE: char = '\u{10FFFF}';
