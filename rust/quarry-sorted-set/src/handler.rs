use std::io::{Read, Write};

use quarry_common::Result;

/// One external partition file.
///
/// A handler is created empty, written once, read any number of times and
/// deleted when its partition is discarded.
pub trait SortedSetFileHandler: Send + Sync {
    /// A human readable location, used in logs and errors.
    fn name(&self) -> &str;

    /// Opens the file for writing, truncating previous content.
    fn create_writer(&self) -> Result<Box<dyn Write + Send>>;

    fn open_reader(&self) -> Result<Box<dyn Read + Send>>;

    /// Current size in bytes.
    fn size(&self) -> Result<u64>;

    /// Removes the file. Deleting a file that was never written succeeds.
    fn delete(&self) -> Result<()>;
}

/// Creates a new, uniquely named partition file per call.
pub trait SortedSetFileHandlerFactory: Send + Sync {
    fn create_handler(&self) -> Result<Box<dyn SortedSetFileHandler>>;
}
