//! A sorted, duplicate-free set that spills to external storage.
//!
//! [`ExternalSortedSet`] keeps recent inserts in an in-memory buffer. Once the
//! buffer reaches its persist threshold it is written out as an immutable,
//! internally sorted partition through a [`SortedSetFileHandler`], and reads
//! merge the buffer with every partition.
//!
//! Where partitions physically live is decided by the caller-supplied
//! [`SortedSetFileHandlerFactory`]:
//!
//! - [`LocalFileHandlerFactory`] - files in a private temporary directory
//! - [`InMemoryHandlerFactory`] - shared byte buffers, for tests and small sets

mod codec;
pub mod handler;
pub mod local;
pub mod memory;
pub mod set;

pub use handler::{SortedSetFileHandler, SortedSetFileHandlerFactory};
pub use local::LocalFileHandlerFactory;
pub use memory::InMemoryHandlerFactory;
pub use set::{ExternalSortedSet, SortedSetIter};

/// Default number of buffered elements before a partition is written.
pub const DEFAULT_PERSIST_THRESHOLD: usize = 1000;
