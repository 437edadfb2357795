use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use quarry_common::{Result, error::Error};
use tempfile::TempDir;

use crate::handler::{SortedSetFileHandler, SortedSetFileHandlerFactory};

/// Writes partitions as files in a private temporary directory.
///
/// The directory is removed once the factory and every handler it created
/// have been dropped.
pub struct LocalFileHandlerFactory {
    dir: Arc<TempDir>,
    prefix: String,
    next_id: AtomicU64,
}

impl LocalFileHandlerFactory {
    /// Creates the directory under the system temp location.
    pub fn temporary() -> Result<LocalFileHandlerFactory> {
        let dir = tempfile::Builder::new()
            .prefix("quarry-sorted-set-")
            .tempdir()
            .map_err(|e| Error::io("create temp dir", e))?;
        Ok(Self::from_dir(dir))
    }

    /// Creates the directory under `parent`, creating `parent` if needed.
    pub fn in_dir(parent: impl AsRef<Path>) -> Result<LocalFileHandlerFactory> {
        let parent = parent.as_ref();
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::io(parent.display().to_string(), e))?;
        let dir = tempfile::Builder::new()
            .prefix("quarry-sorted-set-")
            .tempdir_in(parent)
            .map_err(|e| Error::io(parent.display().to_string(), e))?;
        Ok(Self::from_dir(dir))
    }

    fn from_dir(dir: TempDir) -> LocalFileHandlerFactory {
        LocalFileHandlerFactory {
            dir: Arc::new(dir),
            prefix: "part".to_string(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Sets the file name prefix, e.g. the name of the index term being spilled.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> LocalFileHandlerFactory {
        self.prefix = prefix.into();
        self
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl SortedSetFileHandlerFactory for LocalFileHandlerFactory {
    fn create_handler(&self) -> Result<Box<dyn SortedSetFileHandler>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.path().join(format!("{}-{id:06}.bin", self.prefix));
        Ok(Box::new(LocalFileHandler {
            name: path.display().to_string(),
            path,
            _dir: self.dir.clone(),
        }))
    }
}

struct LocalFileHandler {
    name: String,
    path: PathBuf,
    _dir: Arc<TempDir>,
}

impl SortedSetFileHandler for LocalFileHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_writer(&self) -> Result<Box<dyn Write + Send>> {
        let file = File::create(&self.path).map_err(|e| Error::io(self.name.clone(), e))?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn open_reader(&self) -> Result<Box<dyn Read + Send>> {
        let file = File::open(&self.path).map_err(|e| Error::io(self.name.clone(), e))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn size(&self) -> Result<u64> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(Error::io(self.name.clone(), e)),
        }
    }

    fn delete(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(self.name.clone(), e)),
        }
    }
}
