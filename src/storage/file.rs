//! File-based storage implementation.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, TesseraError};
use crate::storage::{Storage, StorageError, StorageOutput};

/// Configuration for [`FileStorage`].
#[derive(Debug, Clone)]
pub struct FileStorageConfig {
    /// Directory holding the files.
    pub path: PathBuf,

    /// Buffer size for writers.
    pub buffer_size: usize,

    /// Call `fsync` when an output is closed.
    pub sync_writes: bool,
}

impl FileStorageConfig {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileStorageConfig {
            path: path.as_ref().to_path_buf(),
            buffer_size: 64 * 1024,
            sync_writes: false,
        }
    }
}

/// A file-based storage implementation.
#[derive(Debug)]
pub struct FileStorage {
    /// The root directory for storage.
    directory: PathBuf,
    config: FileStorageConfig,
}

impl FileStorage {
    /// Create a new file storage, creating the directory if needed.
    pub fn new(config: FileStorageConfig) -> Result<Self> {
        let directory = config.path.clone();

        if !directory.exists() {
            std::fs::create_dir_all(&directory)
                .map_err(|e| TesseraError::storage(format!("Failed to create directory: {e}")))?;
        }

        if !directory.is_dir() {
            return Err(TesseraError::storage(format!(
                "Path is not a directory: {}",
                directory.display()
            )));
        }

        Ok(FileStorage { directory, config })
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    fn map_open_error(name: &str, e: std::io::Error) -> StorageError {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::FileNotFound(name.to_string())
        } else {
            StorageError::IoError(e.to_string())
        }
    }
}

impl Storage for FileStorage {
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let path = self.file_path(name);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| StorageError::IoError(e.to_string()))?;

        Ok(Box::new(FileOutput::new(
            name.to_string(),
            file,
            self.config.buffer_size,
            self.config.sync_writes,
        )))
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();

        for entry in
            std::fs::read_dir(&self.directory).map_err(|e| StorageError::IoError(e.to_string()))?
        {
            let entry = entry.map_err(|e| StorageError::IoError(e.to_string()))?;
            let path = entry.path();

            if path.is_file() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    files.push(name.to_string());
                }
            }
        }

        files.sort();
        Ok(files)
    }

    fn read_all(&self, name: &str) -> Result<Arc<[u8]>> {
        let bytes =
            std::fs::read(self.file_path(name)).map_err(|e| Self::map_open_error(name, e))?;
        Ok(bytes.into())
    }
}

/// A file output implementation.
#[derive(Debug)]
pub struct FileOutput {
    name: String,
    writer: BufWriter<File>,
    sync_writes: bool,
    position: u64,
    closed: bool,
}

impl FileOutput {
    fn new(name: String, file: File, buffer_size: usize, sync_writes: bool) -> Self {
        FileOutput {
            name,
            writer: BufWriter::with_capacity(buffer_size, file),
            sync_writes,
            position: 0,
            closed: false,
        }
    }

    fn flush_and_sync(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| TesseraError::storage(format!("Failed to flush: {e}")))?;

        self.writer
            .get_ref()
            .sync_all()
            .map_err(|e| TesseraError::storage(format!("Failed to sync: {e}")))?;

        Ok(())
    }
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.closed {
            return Err(std::io::Error::other(
                StorageError::OutputClosed(self.name.clone()).to_string(),
            ));
        }

        let bytes_written = self.writer.write(buf)?;
        self.position += bytes_written as u64;
        Ok(bytes_written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl StorageOutput for FileOutput {
    fn position(&self) -> u64 {
        self.position
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        if self.sync_writes {
            self.flush_and_sync()?;
        } else {
            self.writer.flush()?;
        }
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage_in(dir: &TempDir) -> FileStorage {
        FileStorage::new(FileStorageConfig::new(dir.path())).unwrap()
    }

    #[test]
    fn test_file_storage_creation() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested").join("segments");
        let storage = FileStorage::new(FileStorageConfig::new(&nested)).unwrap();

        assert!(nested.is_dir());
        assert!(storage.list_files().unwrap().is_empty());
    }

    #[test]
    fn test_path_that_is_a_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("plain.txt");
        std::fs::write(&path, b"x").unwrap();

        let err = FileStorage::new(FileStorageConfig::new(&path)).unwrap_err();
        assert!(err.to_string().contains("Path is not a directory"));
    }

    #[test]
    fn test_create_and_read_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir);

        let mut output = storage.create_output("test.txt").unwrap();
        output.write_all(b"Hello, World!").unwrap();
        assert_eq!(output.position(), 13);
        output.close().unwrap();

        assert_eq!(&storage.read_all("test.txt").unwrap()[..], b"Hello, World!");
    }

    #[test]
    fn test_missing_file_errors() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir);

        let err = storage.read_all("nope.bin").unwrap_err();
        assert!(err.to_string().contains("File not found: nope.bin"));
    }

    #[test]
    fn test_list_files_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir);

        for name in ["b.bin", "a.bin"] {
            let mut output = storage.create_output(name).unwrap();
            output.write_all(b"x").unwrap();
            output.close().unwrap();
        }
        std::fs::create_dir(temp_dir.path().join("subdir")).unwrap();

        assert_eq!(storage.list_files().unwrap(), vec!["a.bin", "b.bin"]);
    }

    #[test]
    fn test_sync_writes_close() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = FileStorageConfig::new(temp_dir.path());
        config.sync_writes = true;
        let storage = FileStorage::new(config).unwrap();

        let mut output = storage.create_output("synced.bin").unwrap();
        output.write_all(b"durable").unwrap();
        output.close().unwrap();
        output.close().unwrap();
        assert!(output.write_all(b"late").is_err());

        assert_eq!(&storage.read_all("synced.bin").unwrap()[..], b"durable");
    }
}
