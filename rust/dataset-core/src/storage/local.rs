// rust/dataset-core/src/storage/local.rs

//! Local filesystem storage backend implementation.
//!
//! Small files are read through a buffered reader; files above the
//! configured threshold are memory-mapped so large annotation files can be
//! parsed without an intermediate copy.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use super::traits::{ObjectMeta, StorageBackend, StorageReader, StorageWriter};
use crate::config::StorageConfig;
use crate::error::{DatasetError, Result};

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    /// Buffer size for buffered I/O operations.
    buffer_size: usize,
    /// Whether to use memory-mapped I/O.
    use_mmap: bool,
    /// File size threshold above which to use mmap.
    mmap_threshold: u64,
}

impl Default for LocalStorage {
    fn default() -> Self {
        Self::new(&StorageConfig::default())
    }
}

impl LocalStorage {
    /// Creates a new `LocalStorage` instance from configuration.
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            buffer_size: config.buffer_size,
            use_mmap: config.use_mmap,
            mmap_threshold: config.mmap_threshold,
        }
    }
}

impl StorageBackend for LocalStorage {
    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(path.exists())
    }

    fn metadata(&self, path: &Path) -> Result<ObjectMeta> {
        let meta = fs::metadata(path).map_err(|e| {
            DatasetError::storage_with_source(path, "failed to read metadata", e)
        })?;

        Ok(ObjectMeta {
            size: meta.len(),
            modified: meta.modified().ok(),
            is_dir: meta.is_dir(),
        })
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>> {
        let file = File::open(path)
            .map_err(|e| DatasetError::storage_with_source(path, "failed to open file", e))?;

        let meta = file.metadata().map_err(|e| {
            DatasetError::storage_with_source(path, "failed to read file metadata", e)
        })?;
        let size = meta.len();

        // Use mmap for large files if enabled
        if self.use_mmap && size >= self.mmap_threshold {
            // SAFETY: The file is opened read-only and the Mmap lives as
            // long as the reader.
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
                DatasetError::storage_with_source(path, "failed to memory-map file", e)
            })?;

            Ok(Box::new(MmapReader::new(mmap)))
        } else {
            Ok(Box::new(LocalReader::new(file, size, self.buffer_size)))
        }
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn StorageWriter>> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    DatasetError::storage_with_source(
                        parent,
                        "failed to create parent directories",
                        e,
                    )
                })?;
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| DatasetError::storage_with_source(path, "failed to create file", e))?;

        Ok(Box::new(LocalWriter::new(
            file,
            path.to_path_buf(),
            self.buffer_size,
        )))
    }

    fn delete(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)
            .map_err(|e| DatasetError::storage_with_source(path, "failed to delete file", e))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    DatasetError::storage_with_source(
                        parent,
                        "failed to create parent directories",
                        e,
                    )
                })?;
            }
        }

        fs::rename(from, to).map_err(|e| {
            DatasetError::storage_with_source(
                from,
                format!("failed to rename to {}", to.display()),
                e,
            )
        })
    }
}

/// Buffered file reader for local storage.
struct LocalReader {
    reader: BufReader<File>,
    size: u64,
}

impl LocalReader {
    fn new(file: File, size: u64, buffer_size: usize) -> Self {
        Self {
            reader: BufReader::with_capacity(buffer_size, file),
            size,
        }
    }
}

impl Read for LocalReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl StorageReader for LocalReader {
    fn size(&self) -> u64 {
        self.size
    }
}

/// Memory-mapped file reader for local storage.
struct MmapReader {
    mmap: Mmap,
    position: usize,
}

impl MmapReader {
    fn new(mmap: Mmap) -> Self {
        Self { mmap, position: 0 }
    }
}

impl Read for MmapReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = &self.mmap[self.position..];
        let to_read = buf.len().min(remaining.len());

        buf[..to_read].copy_from_slice(&remaining[..to_read]);
        self.position += to_read;
        Ok(to_read)
    }
}

impl StorageReader for MmapReader {
    fn size(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn as_slice(&self) -> Option<&[u8]> {
        Some(&self.mmap[..])
    }
}

/// Buffered file writer for local storage.
struct LocalWriter {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl LocalWriter {
    fn new(file: File, path: PathBuf, buffer_size: usize) -> Self {
        Self {
            writer: BufWriter::with_capacity(buffer_size, file),
            path,
        }
    }
}

impl Write for LocalWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl StorageWriter for LocalWriter {
    fn finish(mut self: Box<Self>) -> Result<()> {
        self.writer.flush().map_err(|e| {
            DatasetError::storage_with_source(&self.path, "failed to flush writer", e)
        })?;

        // Sync to disk
        self.writer.get_ref().sync_all().map_err(|e| {
            DatasetError::storage_with_source(&self.path, "failed to sync file to disk", e)
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (LocalStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            buffer_size: 4096,
            use_mmap: true,
            mmap_threshold: 1024, // Low threshold for testing
        };
        (LocalStorage::new(&config), temp_dir)
    }

    fn write_file(storage: &LocalStorage, path: &Path, data: &[u8]) {
        let mut writer = storage.open_write(path).unwrap();
        writer.write_all(data).unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_exists_file() {
        let (storage, temp) = create_test_storage();
        let path = temp.path().join("test.txt");

        assert!(!storage.exists(&path).unwrap());
        write_file(&storage, &path, b"hello");
        assert!(storage.exists(&path).unwrap());
    }

    #[test]
    fn test_metadata_file() {
        let (storage, temp) = create_test_storage();
        let path = temp.path().join("test.txt");
        write_file(&storage, &path, b"hello world");

        let meta = storage.metadata(&path).unwrap();
        assert_eq!(meta.size, 11);
        assert!(!meta.is_dir);
    }

    #[test]
    fn test_metadata_not_found() {
        let (storage, temp) = create_test_storage();
        assert!(storage.metadata(&temp.path().join("missing")).is_err());
    }

    #[test]
    fn test_small_file_is_buffered() {
        let (storage, temp) = create_test_storage();
        let path = temp.path().join("small.txt");
        write_file(&storage, &path, b"hello world");

        let mut reader = storage.open_read(&path).unwrap();
        assert!(reader.as_slice().is_none());
        assert_eq!(reader.read_all().unwrap(), b"hello world");
        assert_eq!(reader.size(), 11);
    }

    #[test]
    fn test_large_file_is_mapped() {
        let (storage, temp) = create_test_storage();
        let path = temp.path().join("large.bin");
        let data: Vec<u8> = (0..2048).map(|i| (i % 256) as u8).collect();
        write_file(&storage, &path, &data);

        let mut reader = storage.open_read(&path).unwrap();
        assert_eq!(reader.as_slice(), Some(&data[..]));
        assert_eq!(reader.read_all().unwrap(), data);
    }

    #[test]
    fn test_open_write_creates_parents() {
        let (storage, temp) = create_test_storage();
        let path = temp.path().join("a/b/c.bin");
        write_file(&storage, &path, b"x");
        assert!(path.exists());
    }

    #[test]
    fn test_rename_and_delete() {
        let (storage, temp) = create_test_storage();
        let from = temp.path().join(".tmp");
        let to = temp.path().join("nested/final");
        write_file(&storage, &from, b"data");

        storage.rename(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"data");

        storage.delete(&to).unwrap();
        assert!(!to.exists());
    }

    #[test]
    fn test_open_read_missing_file() {
        let (storage, temp) = create_test_storage();
        let result = storage.open_read(&temp.path().join("missing.json"));
        assert!(matches!(result, Err(DatasetError::Storage { .. })));
    }
}
