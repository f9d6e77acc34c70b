//! Locked JSON snapshot files
//!
//! A `JsonStore` keeps one serializable value as the whole contents of one JSON
//! file. Reads and writes are serialized through an exclusive OS lock on a
//! sibling `<file>.lock`, and saves go through a temporary file that is renamed
//! over the canonical path, so readers only ever see a complete snapshot.
//!
//! Callers that need a read-modify-write sequence take the lock once with
//! [`JsonStore::lock`] and use [`JsonStore::load_locked`] /
//! [`JsonStore::save_locked`] while holding the guard.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// How long [`JsonStore::lock`] waits before reporting the store unavailable
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay between lock attempts while another holder owns the lock
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(15);

/// Suffix appended to the snapshot path to form the lock file path
const LOCK_SUFFIX: &str = ".lock";

/// Errors raised while reading or writing a snapshot file
#[derive(Debug, Error)]
pub enum StoreError {
    /// The snapshot exists but does not parse
    #[error("store unreadable at {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The lock was held by someone else for longer than the timeout
    #[error("store unavailable: could not lock {} within {waited:?}", path.display())]
    Unavailable { path: PathBuf, waited: Duration },

    /// The lock file could not be opened or locked
    #[error("store unavailable: lock file {}: {source}", path.display())]
    LockFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The directory holding the snapshot could not be created
    #[error("failed to create store directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A blocking store operation was abandoned before it finished
    #[error("store operation on {} did not complete", path.display())]
    Interrupted { path: PathBuf },

    /// The snapshot exists but could not be read
    #[error("failed to read store {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Serializing, writing or renaming the new snapshot failed
    #[error("failed to save store {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Coarse classification of a [`StoreError`] for tagged results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// The snapshot is corrupt
    Unreadable,
    /// The lock could not be obtained
    Unavailable,
    /// Any other filesystem failure
    Io,
}

impl StoreError {
    /// Returns the coarse kind of this error
    pub fn kind(&self) -> StoreErrorKind {
        match self {
            StoreError::Unreadable { .. } => StoreErrorKind::Unreadable,
            StoreError::Unavailable { .. } | StoreError::LockFile { .. } => {
                StoreErrorKind::Unavailable
            }
            StoreError::Directory { .. }
            | StoreError::Interrupted { .. }
            | StoreError::Read { .. }
            | StoreError::Write { .. } => StoreErrorKind::Io,
        }
    }
}

/// Proof that the caller holds a store's lock
///
/// The lock is released when the guard is dropped, on every exit path.
#[derive(Debug)]
pub struct StoreGuard<'a> {
    file: File,
    lock_path: &'a Path,
}

impl Drop for StoreGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            // Closing the descriptor right after this releases the lock anyway.
            warn!(lock = %self.lock_path.display(), "failed to unlock store: {}", e);
        }
    }
}

/// A JSON file holding one complete snapshot of `T`
#[derive(Debug)]
pub struct JsonStore<T> {
    path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
    _snapshot: PhantomData<fn() -> T>,
}

impl<T> Clone for JsonStore<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            lock_path: self.lock_path.clone(),
            lock_timeout: self.lock_timeout,
            _snapshot: PhantomData,
        }
    }
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Creates a store for the snapshot file at `path`
    ///
    /// Nothing is touched on disk until the first load or save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_path = OsString::from(path.as_os_str());
        lock_path.push(LOCK_SUFFIX);
        Self {
            path,
            lock_path: PathBuf::from(lock_path),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            _snapshot: PhantomData,
        }
    }

    /// Sets how long lock acquisition may wait before giving up
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Path of the snapshot file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn create_dir(&self) -> Result<(), StoreError> {
        let dir = self.dir();
        fs::create_dir_all(dir).map_err(|source| StoreError::Directory {
            path: dir.to_path_buf(),
            source,
        })
    }

    /// Acquires the exclusive lock, polling until the timeout elapses
    pub fn lock(&self) -> Result<StoreGuard<'_>, StoreError> {
        let lock_err = |source| StoreError::LockFile {
            path: self.lock_path.clone(),
            source,
        };

        self.create_dir()?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(lock_err)?;

        let started = Instant::now();
        loop {
            match file.try_lock() {
                Ok(()) => {
                    return Ok(StoreGuard {
                        file,
                        lock_path: &self.lock_path,
                    })
                }
                Err(TryLockError::WouldBlock) => {
                    let waited = started.elapsed();
                    if waited >= self.lock_timeout {
                        warn!(lock = %self.lock_path.display(), ?waited, "gave up waiting for store lock");
                        return Err(StoreError::Unavailable {
                            path: self.lock_path.clone(),
                            waited,
                        });
                    }
                    thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(TryLockError::Error(source)) => return Err(lock_err(source)),
            }
        }
    }

    /// Loads the snapshot under its own lock
    pub fn load(&self) -> Result<T, StoreError> {
        let guard = self.lock()?;
        self.load_locked(&guard)
    }

    /// Saves the snapshot under its own lock
    pub fn save(&self, snapshot: &T) -> Result<(), StoreError> {
        let guard = self.lock()?;
        self.save_locked(&guard, snapshot)
    }

    /// Loads, mutates and saves the snapshot as one critical section
    pub fn update<R>(&self, mutate: impl FnOnce(&mut T) -> R) -> Result<R, StoreError> {
        let guard = self.lock()?;
        let mut snapshot = self.load_locked(&guard)?;
        let result = mutate(&mut snapshot);
        self.save_locked(&guard, &snapshot)?;
        Ok(result)
    }

    /// Loads the snapshot while the caller holds the lock
    ///
    /// A missing file is an empty snapshot. A file that does not parse is
    /// [`StoreError::Unreadable`]; it is never replaced by an empty value here.
    pub fn load_locked(&self, guard: &StoreGuard<'_>) -> Result<T, StoreError> {
        debug_assert_eq!(guard.lock_path, self.lock_path.as_path());

        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no snapshot yet, starting empty");
                return Ok(T::default());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_slice(&bytes).map_err(|source| StoreError::Unreadable {
            path: self.path.clone(),
            source,
        })
    }

    /// Replaces the snapshot while the caller holds the lock
    ///
    /// The new contents are written and synced to a temporary file in the
    /// same directory, then renamed over the canonical path. If any step
    /// fails the temporary file is removed and the previous snapshot stays.
    pub fn save_locked(&self, guard: &StoreGuard<'_>, snapshot: &T) -> Result<(), StoreError> {
        debug_assert_eq!(guard.lock_path, self.lock_path.as_path());

        self.create_dir()?;
        let dir = self.dir();

        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| self.write_error(io::Error::new(io::ErrorKind::InvalidData, e)))?;

        let prefix = match self.path.file_name() {
            Some(name) => format!(".{}.", name.to_string_lossy()),
            None => ".snapshot.".to_string(),
        };
        let mut tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| self.write_error(e))?;

        tmp.write_all(&json).map_err(|e| self.write_error(e))?;
        tmp.as_file().sync_all().map_err(|e| self.write_error(e))?;
        tmp.persist(&self.path)
            .map_err(|e| self.write_error(e.error))?;

        debug!(path = %self.path.display(), bytes = json.len(), "snapshot replaced");
        Ok(())
    }

    fn write_error(&self, source: io::Error) -> StoreError {
        StoreError::Write {
            path: self.path.clone(),
            source,
        }
    }
}
