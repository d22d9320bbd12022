//! File-based state backend for persistent storage.
//!
//! Layout of a state directory:
//!
//! ```text
//! <state_dir>/
//! ├─ LOCK                   # Advisory lock for single-writer
//! ├─ pending_writes.state   # One file per key
//! └─ tombstones.state
//! ```

use crate::backend::{validate_key, StateBackend};
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const STATE_EXT: &str = "state";
const TEMP_EXT: &str = "tmp";

/// A file-based state backend.
///
/// Every key is stored in its own file inside the state directory. Writes go
/// through a write-then-rename sequence so a crash leaves either the old or
/// the new blob on disk.
///
/// # Locking
///
/// The backend holds an exclusive advisory lock on `LOCK` for its lifetime.
/// A second backend (in this or another process) on the same directory fails
/// with [`StorageError::Locked`].
///
/// # Example
///
/// ```no_run
/// use docsync_storage::{FileBackend, StateBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("sync-state")).unwrap();
/// backend.store("tombstones", b"...").unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    _lock_file: File,
    write_guard: Mutex<()>,
}

impl FileBackend {
    /// Opens or creates a state directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - The path exists but is not a directory
    /// - Another backend holds the lock (returns `Locked`)
    pub fn open(path: &Path) -> StorageResult<Self> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(StorageError::Corrupted(format!(
                "state path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.display().to_string()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
            write_guard: Mutex::new(()),
        })
    }

    /// Returns the path to the state directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.path.join(format!("{key}.{STATE_EXT}"))
    }

    /// Fsyncs the directory so a completed rename is durable.
    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StorageResult<()> {
        Ok(())
    }
}

impl StateBackend for FileBackend {
    fn load(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;

        let mut file = match File::open(self.blob_path(key)) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(Some(data))
    }

    fn store(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        let _guard = self.write_guard.lock();

        let final_path = self.blob_path(key);
        let temp_path = self.path.join(format!("{key}.{TEMP_EXT}"));

        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &final_path)?;
        self.sync_directory()
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        let _guard = self.write_guard.lock();

        match fs::remove_file(self.blob_path(key)) {
            Ok(()) => self.sync_directory(),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(STATE_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state");

        let backend = FileBackend::open(&path).unwrap();
        assert!(path.join(LOCK_FILE).exists());
        assert!(backend.keys().unwrap().is_empty());
    }

    #[test]
    fn file_store_and_load() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend.store("pending_writes", b"hello").unwrap();
        assert_eq!(
            backend.load("pending_writes").unwrap(),
            Some(b"hello".to_vec())
        );
        assert!(!dir.path().join("pending_writes.tmp").exists());
    }

    #[test]
    fn file_load_missing() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        assert_eq!(backend.load("absent").unwrap(), None);
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();

        {
            let backend = FileBackend::open(dir.path()).unwrap();
            backend.store("tombstones", b"persistent data").unwrap();
        }

        {
            let backend = FileBackend::open(dir.path()).unwrap();
            assert_eq!(
                backend.load("tombstones").unwrap(),
                Some(b"persistent data".to_vec())
            );
        }
    }

    #[test]
    fn file_second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _first = FileBackend::open(dir.path()).unwrap();

        let second = FileBackend::open(dir.path());
        assert!(matches!(second, Err(StorageError::Locked(_))));
    }

    #[test]
    fn file_remove() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend.store("a", b"1").unwrap();
        backend.remove("a").unwrap();
        backend.remove("a").unwrap();
        assert_eq!(backend.load("a").unwrap(), None);
    }

    #[test]
    fn file_keys_ignore_other_files() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend.store("b", b"").unwrap();
        backend.store("a", b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        assert_eq!(backend.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn file_rejects_invalid_key() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        assert!(matches!(
            backend.store("../escape", b"x"),
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn file_path() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        assert_eq!(backend.path(), dir.path());
    }
}
