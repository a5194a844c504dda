//! Byte storage abstraction used by the postings codecs.
//!
//! Codecs persist their files through the [`Storage`] trait: append-only
//! [`StorageOutput`] streams on the write side and whole-file
//! [`Storage::read_all`] on the read side. Two backends are provided:
//!
//! - [`MemoryStorage`](memory::MemoryStorage): files live in memory, useful for
//!   tests and the conformance runner.
//! - [`FileStorage`](file::FileStorage): files live in a directory on disk.
//!
//! # Example
//!
//! ```
//! use std::io::Write;
//!
//! use tessera::storage::memory::MemoryStorageConfig;
//! use tessera::storage::{StorageConfig, StorageFactory};
//!
//! # fn main() -> tessera::error::Result<()> {
//! let storage = StorageFactory::create(StorageConfig::Memory(MemoryStorageConfig::default()))?;
//!
//! let mut output = storage.create_output("segment.bin")?;
//! output.write_all(b"postings")?;
//! output.close()?;
//!
//! assert_eq!(&storage.read_all("segment.bin")?[..], b"postings");
//! # Ok(())
//! # }
//! ```

use std::io::Write;
use std::sync::Arc;

use crate::error::{Result, TesseraError};

pub mod file;
pub mod memory;
pub mod structured;

/// A trait for storage backends that can store and retrieve files.
///
/// Files are written once through [`StorageOutput`] and become visible to
/// readers when the output is closed.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Create (or truncate) a file for writing.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// List all file names, sorted.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Read a whole file into a shared, immutable buffer.
    fn read_all(&self, name: &str) -> Result<Arc<[u8]>>;
}

/// A trait for append-only writing to storage.
pub trait StorageOutput: Write + Send + std::fmt::Debug {
    /// Number of bytes written so far.
    fn position(&self) -> u64;

    /// Finish the file. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;
}

impl StorageOutput for Box<dyn StorageOutput> {
    fn position(&self) -> u64 {
        self.as_ref().position()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}

/// Configuration for storage backends.
///
/// Each variant carries the configuration of one backend; the path is part of
/// [`FileStorageConfig`](file::FileStorageConfig).
#[derive(Debug, Clone)]
pub enum StorageConfig {
    File(file::FileStorageConfig),

    Memory(memory::MemoryStorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory(memory::MemoryStorageConfig::default())
    }
}

/// A factory for creating storage instances from a [`StorageConfig`].
pub struct StorageFactory;

impl StorageFactory {
    pub fn create(config: StorageConfig) -> Result<Arc<dyn Storage>> {
        match config {
            StorageConfig::Memory(mem_config) => {
                let storage = memory::MemoryStorage::new(mem_config);
                Ok(Arc::new(storage))
            }
            StorageConfig::File(file_config) => {
                let storage = file::FileStorage::new(file_config)?;
                Ok(Arc::new(storage))
            }
        }
    }
}

/// Error types specific to storage operations.
#[derive(Debug, Clone)]
pub enum StorageError {
    FileNotFound(String),

    IoError(String),

    OutputClosed(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::FileNotFound(name) => write!(f, "File not found: {name}"),
            StorageError::IoError(msg) => write!(f, "I/O error: {msg}"),
            StorageError::OutputClosed(name) => write!(f, "Output already closed: {name}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for TesseraError {
    fn from(err: StorageError) -> Self {
        TesseraError::storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::file::FileStorageConfig;

    #[test]
    fn test_storage_config_default() {
        match StorageConfig::default() {
            StorageConfig::Memory(mem_config) => {
                assert_eq!(mem_config.initial_capacity, 16);
            }
            _ => panic!("Expected Memory config"),
        }
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::FileNotFound("seg.tim".to_string());
        assert_eq!(err.to_string(), "File not found: seg.tim");

        let err = StorageError::OutputClosed("seg.doc".to_string());
        assert_eq!(err.to_string(), "Output already closed: seg.doc");

        let err: TesseraError = StorageError::IoError("disk full".to_string()).into();
        assert_eq!(err.to_string(), "Storage error: I/O error: disk full");
    }

    #[test]
    fn test_factory_creates_both_backends() {
        let dir = tempfile::tempdir().unwrap();

        let memory = StorageFactory::create(StorageConfig::default()).unwrap();
        let file = StorageFactory::create(StorageConfig::File(FileStorageConfig::new(dir.path())))
            .unwrap();

        for storage in [memory, file] {
            let mut output = storage.create_output("a.bin").unwrap();
            output.write_all(b"abc").unwrap();
            assert_eq!(output.position(), 3);
            output.close().unwrap();

            assert_eq!(storage.list_files().unwrap(), vec!["a.bin"]);
            assert_eq!(&storage.read_all("a.bin").unwrap()[..], b"abc");
        }
    }
}
