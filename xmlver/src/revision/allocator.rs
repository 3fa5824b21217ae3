//! Revision number allocation.
//!
//! Revision numbers are global: every recorded change of any document takes
//! the next number from one shared counter.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::constants::REVISION_COUNTER_FILE;
use crate::error::{Error, Result};

/// Source of fresh revision numbers.
///
/// Implementations must hand out strictly increasing numbers, also when
/// called from several threads at once.
pub trait RevisionAllocator: Send + Sync {
    /// Allocates and returns the next revision number.
    fn next_revision(&self) -> Result<u64>;

    /// The last number handed out, 0 if none.
    fn current(&self) -> Result<u64>;
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> Error {
    Error::Allocation(format!("lock poisoned: {e}"))
}

/// Counter persisted as an 8-byte big-endian integer in
/// `<data_dir>/versions.dbx`.
///
/// Every allocation reads the file, increments and writes it back while
/// holding the lock. A missing file starts the count at 0; an unreadable one
/// is logged and treated the same way.
#[derive(Debug)]
pub struct FileRevisionCounter {
    path: PathBuf,
    latch: Mutex<()>,
}

impl FileRevisionCounter {
    /// Opens the counter in `data_dir`, creating the directory if needed.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;
        Ok(FileRevisionCounter {
            path: data_dir.join(REVISION_COUNTER_FILE),
            latch: Mutex::new(()),
        })
    }

    /// Location of the counter file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> u64 {
        match fs::read(&self.path) {
            Ok(bytes) => match <[u8; 8]>::try_from(bytes.get(..8).unwrap_or_default()) {
                Ok(raw) => u64::from_be_bytes(raw),
                Err(_) => {
                    warn!(
                        path = %self.path.display(),
                        "revision counter file is truncated, restarting at 0"
                    );
                    0
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read revision counter");
                0
            }
        }
    }
}

impl RevisionAllocator for FileRevisionCounter {
    fn next_revision(&self) -> Result<u64> {
        let _guard = self.latch.lock().map_err(poisoned)?;
        let revision = self.read() + 1;
        fs::write(&self.path, revision.to_be_bytes()).map_err(|e| {
            Error::Allocation(format!("failed to write {}: {e}", self.path.display()))
        })?;
        debug!(revision, "allocated revision");
        Ok(revision)
    }

    fn current(&self) -> Result<u64> {
        let _guard = self.latch.lock().map_err(poisoned)?;
        Ok(self.read())
    }
}

/// Counter kept in memory only, for tests and short-lived processes.
#[derive(Debug, Default)]
pub struct MemoryRevisionCounter {
    value: Mutex<u64>,
}

impl MemoryRevisionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A counter whose next allocation returns `last + 1`.
    pub fn starting_after(last: u64) -> Self {
        MemoryRevisionCounter {
            value: Mutex::new(last),
        }
    }
}

impl RevisionAllocator for MemoryRevisionCounter {
    fn next_revision(&self) -> Result<u64> {
        let mut value = self.value.lock().map_err(poisoned)?;
        *value += 1;
        Ok(*value)
    }

    fn current(&self) -> Result<u64> {
        Ok(*self.value.lock().map_err(poisoned)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_memory_counter_increments() {
        let counter = MemoryRevisionCounter::new();
        assert_eq!(counter.current().unwrap(), 0);
        assert_eq!(counter.next_revision().unwrap(), 1);
        assert_eq!(counter.next_revision().unwrap(), 2);
        assert_eq!(counter.current().unwrap(), 2);

        let counter = MemoryRevisionCounter::starting_after(41);
        assert_eq!(counter.next_revision().unwrap(), 42);
    }

    #[test]
    fn test_file_counter_starts_at_zero_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let counter = FileRevisionCounter::open(dir.path()).unwrap();
        assert_eq!(counter.current().unwrap(), 0);
        assert_eq!(counter.next_revision().unwrap(), 1);
        assert_eq!(counter.next_revision().unwrap(), 2);

        let bytes = fs::read(dir.path().join(REVISION_COUNTER_FILE)).unwrap();
        assert_eq!(bytes, 2u64.to_be_bytes());

        let reopened = FileRevisionCounter::open(dir.path()).unwrap();
        assert_eq!(reopened.next_revision().unwrap(), 3);
    }

    #[test]
    fn test_file_counter_reads_existing_value() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(REVISION_COUNTER_FILE), 99u64.to_be_bytes()).unwrap();
        let counter = FileRevisionCounter::open(dir.path()).unwrap();
        assert_eq!(counter.next_revision().unwrap(), 100);
    }

    #[test]
    fn test_file_counter_truncated_file_restarts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(REVISION_COUNTER_FILE), [1u8, 2, 3]).unwrap();
        let counter = FileRevisionCounter::open(dir.path()).unwrap();
        assert_eq!(counter.next_revision().unwrap(), 1);
    }

    #[test]
    fn test_memory_counter_concurrent_allocations_are_distinct() {
        let counter = Arc::new(MemoryRevisionCounter::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    (0..50)
                        .map(|_| counter.next_revision().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (1..=400).collect::<Vec<_>>());
    }
}
