use std::{
    io::{Cursor, Read, Write},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use quarry_common::{Result, error::Error};

use crate::handler::{SortedSetFileHandler, SortedSetFileHandlerFactory};

type FileMap = ahash::HashMap<String, Arc<[u8]>>;

/// Keeps partitions as shared in-memory buffers.
///
/// Clones share the same file map, which lets tests observe how many
/// partitions a set currently holds.
#[derive(Clone, Default)]
pub struct InMemoryHandlerFactory {
    files: Arc<Mutex<FileMap>>,
    next_id: Arc<AtomicU64>,
}

impl InMemoryHandlerFactory {
    pub fn new() -> InMemoryHandlerFactory {
        Default::default()
    }

    /// Number of partition files that have been written and not deleted.
    pub fn file_count(&self) -> usize {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Total bytes across all live partition files.
    pub fn total_bytes(&self) -> u64 {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|b| b.len() as u64)
            .sum()
    }
}

impl SortedSetFileHandlerFactory for InMemoryHandlerFactory {
    fn create_handler(&self) -> Result<Box<dyn SortedSetFileHandler>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(InMemoryHandler {
            name: format!("memory://part-{id:06}"),
            files: self.files.clone(),
        }))
    }
}

struct InMemoryHandler {
    name: String,
    files: Arc<Mutex<FileMap>>,
}

impl InMemoryHandler {
    fn contents(&self) -> Option<Arc<[u8]>> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&self.name)
            .cloned()
    }
}

impl SortedSetFileHandler for InMemoryHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_writer(&self) -> Result<Box<dyn Write + Send>> {
        Ok(Box::new(InMemoryWriter {
            name: self.name.clone(),
            files: self.files.clone(),
            buf: Vec::new(),
        }))
    }

    fn open_reader(&self) -> Result<Box<dyn Read + Send>> {
        let contents = self.contents().ok_or_else(|| {
            Error::io(
                self.name.clone(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "partition was never written"),
            )
        })?;
        Ok(Box::new(Cursor::new(contents)))
    }

    fn size(&self) -> Result<u64> {
        Ok(self.contents().map_or(0, |c| c.len() as u64))
    }

    fn delete(&self) -> Result<()> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
        Ok(())
    }
}

/// Buffers writes and publishes them on flush and on drop.
struct InMemoryWriter {
    name: String,
    files: Arc<Mutex<FileMap>>,
    buf: Vec<u8>,
}

impl Write for InMemoryWriter {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(self.name.clone(), Arc::from(self.buf.as_slice()));
        Ok(())
    }
}

impl Drop for InMemoryWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
