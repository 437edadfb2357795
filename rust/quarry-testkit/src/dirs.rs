//! Spill locations for ivarator sets in tests.

use std::sync::Arc;

use quarry_sorted_set::{InMemoryHandlerFactory, LocalFileHandlerFactory, SortedSetFileHandlerFactory};
use tempfile::TempDir;

/// A temporary directory and a factory spilling partitions into it.
///
/// The directory outlives the returned factory only as long as the caller
/// keeps the `TempDir`.
pub fn temp_spill() -> anyhow::Result<(TempDir, Arc<dyn SortedSetFileHandlerFactory>)> {
    let dir = tempfile::Builder::new().prefix("quarry-spill-").tempdir()?;
    let factory = LocalFileHandlerFactory::in_dir(dir.path())?;
    Ok((dir, Arc::new(factory)))
}

/// A spill factory that keeps partitions in memory.
pub fn memory_spill() -> Arc<dyn SortedSetFileHandlerFactory> {
    Arc::new(InMemoryHandlerFactory::new())
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_temp_spill() {
        let (dir, _factory) = super::temp_spill().unwrap();
        assert!(dir.path().is_dir());
    }
}
