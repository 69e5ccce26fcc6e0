//! Persisted sample log.
//!
//! Appends one CSV line per sample to a file on removable storage:
//!
//! ```text
//! "PT1", 312.4, 0.4127, 120394
//! ```
//!
//! The file is opened in append mode on mount and closed on eject.  While
//! nothing is mounted every append fails with
//! [`StorageError::Unavailable`], which sensors swallow.  The lock is held
//! only for the duration of one append.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{info, warn};

use crate::app::ports::{Record, RecordSink};
use crate::error::StorageError;

struct Mounted {
    path: PathBuf,
    file: File,
}

/// Mountable CSV log shared by every sensor.
#[derive(Default)]
pub struct DataLog {
    mounted: Mutex<Option<Mounted>>,
}

impl DataLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or create) `path` for appending.  Replaces any mounted file.
    pub fn mount(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                warn!("DataLog: mount {} failed: {}", path.display(), e);
                StorageError::Io
            })?;
        let previous = self.lock().replace(Mounted {
            path: path.to_path_buf(),
            file,
        });
        if let Some(previous) = previous {
            info!("DataLog: replaced {}", previous.path.display());
        }
        info!("DataLog: mounted {}", path.display());
        Ok(())
    }

    /// Close the mounted file.
    pub fn eject(&self) -> Result<(), StorageError> {
        let Some(mut mounted) = self.lock().take() else {
            return Err(StorageError::Unavailable);
        };
        let flushed = mounted.file.flush();
        info!("DataLog: ejected {}", mounted.path.display());
        flushed.map_err(|_| StorageError::Io)
    }

    pub fn is_mounted(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Mounted>> {
        self.mounted.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordSink for DataLog {
    fn append(&self, record: &Record<'_>) -> Result<(), StorageError> {
        let mut guard = self.lock();
        let mounted = guard.as_mut().ok_or(StorageError::Unavailable)?;
        writeln!(
            mounted.file,
            "\"{}\", {}, {}, {}",
            record.name, record.value, record.raw, record.time_ms
        )
        .and_then(|()| mounted.file.flush())
        .map_err(|_| StorageError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(time_ms: u64) -> Record<'static> {
        Record {
            name: "PT1",
            value: 12.5,
            raw: 0.25,
            time_ms,
        }
    }

    #[test]
    fn unmounted_append_is_unavailable() {
        let log = DataLog::new();
        assert_eq!(log.append(&record(1)), Err(StorageError::Unavailable));
        assert_eq!(log.eject(), Err(StorageError::Unavailable));
    }

    #[test]
    fn appends_csv_lines_until_eject() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let log = DataLog::new();

        log.mount(&path).unwrap();
        assert!(log.is_mounted());
        log.append(&record(10)).unwrap();
        log.append(&record(20)).unwrap();
        log.eject().unwrap();
        assert_eq!(log.append(&record(30)), Err(StorageError::Unavailable));

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "\"PT1\", 12.5, 0.25, 10\n\"PT1\", 12.5, 0.25, 20\n");
    }

    #[test]
    fn remount_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let log = DataLog::new();

        log.mount(&path).unwrap();
        log.append(&record(1)).unwrap();
        log.eject().unwrap();
        log.mount(&path).unwrap();
        log.append(&record(2)).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn mount_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let log = DataLog::new();
        let err = log.mount(dir.path().join("absent").join("log.txt"));
        assert_eq!(err, Err(StorageError::Io));
        assert!(!log.is_mounted());
    }
}
