//! Local filesystem segment store.

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use metalog_core::WalSyncMode;

use super::{SegmentSink, SegmentStore};

/// Segment store backed by `std::fs`.
#[derive(Debug, Clone)]
pub struct LocalSegmentStore {
    /// Sync the destination directory after renames so the new name is durable.
    sync_directory_after_rename: bool,
}

impl Default for LocalSegmentStore {
    fn default() -> Self {
        Self { sync_directory_after_rename: true }
    }
}

impl LocalSegmentStore {
    /// Create a local store that syncs directories after renames.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a local store that never syncs directory entries.
    #[must_use]
    pub fn without_directory_sync() -> Self {
        Self { sync_directory_after_rename: false }
    }

    #[cfg(unix)]
    fn sync_parent(path: &Path) -> std::io::Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => File::open(parent)?.sync_all(),
            _ => Ok(()),
        }
    }

    #[cfg(not(unix))]
    fn sync_parent(_path: &Path) -> std::io::Result<()> {
        Ok(())
    }
}

impl SegmentStore for LocalSegmentStore {
    fn exists(&self, path: &Path) -> std::io::Result<bool> {
        path.try_exists()
    }

    fn open(&self, path: &Path) -> std::io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(path)?))
    }

    fn create(&self, path: &Path) -> std::io::Result<Box<dyn SegmentSink>> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        Ok(Box::new(LocalSink { file }))
    }

    fn delete(&self, path: &Path, recursive: bool) -> std::io::Result<bool> {
        let metadata = match fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };

        if metadata.is_dir() {
            if recursive {
                fs::remove_dir_all(path)?;
            } else {
                fs::remove_dir(path)?;
            }
        } else {
            fs::remove_file(path)?;
        }
        Ok(true)
    }

    fn rename(&self, src: &Path, dst: &Path) -> std::io::Result<bool> {
        if !src.try_exists()? {
            return Ok(false);
        }
        fs::rename(src, dst)?;
        if self.sync_directory_after_rename {
            Self::sync_parent(dst)?;
        }
        Ok(true)
    }

    fn mkdirs(&self, path: &Path, create_parents: bool) -> std::io::Result<bool> {
        if path.is_dir() {
            return Ok(true);
        }
        if create_parents {
            fs::create_dir_all(path)?;
        } else {
            fs::create_dir(path)?;
        }
        Ok(true)
    }

    fn list(&self, dir: &Path) -> std::io::Result<Vec<String>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Append handle for a local segment file.
struct LocalSink {
    file: File,
}

impl Write for LocalSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl SegmentSink for LocalSink {
    fn sync(&mut self, mode: WalSyncMode) -> std::io::Result<()> {
        match mode {
            WalSyncMode::None => Ok(()),
            WalSyncMode::Fdatasync => self.file.sync_data(),
            WalSyncMode::Fsync => self.file.sync_all(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_create_write_and_open() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalSegmentStore::new();
        let path = temp_dir.path().join("nested").join("log.data");

        let mut sink = store.create(&path).unwrap();
        sink.write_all(b"hello\n").unwrap();
        sink.flush().unwrap();
        sink.sync(WalSyncMode::Fsync).unwrap();
        drop(sink);

        assert!(store.exists(&path).unwrap());
        let mut contents = String::new();
        store.open(&path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "hello\n");
    }

    #[test]
    fn test_create_truncates_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalSegmentStore::new();
        let path = temp_dir.path().join("log.data");
        std::fs::write(&path, b"stale contents").unwrap();

        drop(store.create(&path).unwrap());

        assert_eq!(std::fs::read(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_delete_missing_returns_false() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalSegmentStore::new();

        assert!(!store.delete(&temp_dir.path().join("missing"), true).unwrap());
    }

    #[test]
    fn test_delete_directory_recursively() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalSegmentStore::new();
        let dir = temp_dir.path().join("completed");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("0.segment"), b"x").unwrap();

        assert!(store.delete(&dir, false).is_err());
        assert!(store.delete(&dir, true).unwrap());
        assert!(!store.exists(&dir).unwrap());
    }

    #[test]
    fn test_rename_missing_source_returns_false() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalSegmentStore::new();

        let renamed = store
            .rename(&temp_dir.path().join("missing"), &temp_dir.path().join("target"))
            .unwrap();
        assert!(!renamed);
    }

    #[test]
    fn test_rename_moves_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalSegmentStore::new();
        let src = temp_dir.path().join("log.data");
        let dst_dir = temp_dir.path().join("completed");
        std::fs::write(&src, b"record\n").unwrap();
        store.mkdirs(&dst_dir, true).unwrap();

        assert!(store.rename(&src, &dst_dir.join("0.segment")).unwrap());
        assert!(!src.exists());
        assert_eq!(std::fs::read(dst_dir.join("0.segment")).unwrap(), b"record\n");
    }

    #[test]
    fn test_mkdirs_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalSegmentStore::new();
        let dir = temp_dir.path().join("a").join("b");

        assert!(store.mkdirs(&dir, false).is_err());
        assert!(store.mkdirs(&dir, true).unwrap());
        assert!(store.mkdirs(&dir, true).unwrap());
    }

    #[test]
    fn test_list_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalSegmentStore::new();

        assert!(store.list(&temp_dir.path().join("completed")).unwrap().is_empty());
    }

    #[test]
    fn test_list_returns_sorted_names() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalSegmentStore::new();
        std::fs::write(temp_dir.path().join("1.segment"), b"").unwrap();
        std::fs::write(temp_dir.path().join("0.segment"), b"").unwrap();

        assert_eq!(store.list(temp_dir.path()).unwrap(), vec!["0.segment", "1.segment"]);
    }
}
