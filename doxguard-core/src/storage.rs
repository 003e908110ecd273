//! Document persistence for the exception store and the detection ledger.
//!
//! Storage is deliberately dumb: a backend reads and writes whole documents by key.
//! `write_with_retry` layers the retry policy on top so that transient failures never
//! reach the caller unless every attempt fails.
//!
//! License: MIT OR Apache-2.0

use log::{debug, error, warn};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use crate::config::PersistenceConfig;
use crate::errors::GuardError;

const DOCUMENT_EXTENSION: &str = "json";
const DOCUMENT_TMP_SUFFIX: &str = ".tmp";

/// A place where whole documents are read and written by key.
pub trait DocumentBackend: Send + Sync {
    /// Returns `Ok(None)` when no document has been written under `key` yet.
    fn read_document(&self, key: &str) -> Result<Option<Vec<u8>>, GuardError>;

    /// Replaces the document under `key`. Must be durable when it returns `Ok`.
    fn write_document(&self, key: &str, bytes: &[u8]) -> Result<(), GuardError>;
}

/// Stores each document as `<root>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, GuardError> {
        let valid = !key.is_empty()
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(GuardError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid document key '{}'", key),
            )));
        }
        Ok(self.root.join(format!("{}.{}", key, DOCUMENT_EXTENSION)))
    }
}

impl DocumentBackend for FileBackend {
    fn read_document(&self, key: &str) -> Result<Option<Vec<u8>>, GuardError> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }

        let mut f = OpenOptions::new().read(true).open(&path)?;
        fs2::FileExt::lock_shared(&f)?;

        let mut raw = Vec::new();
        let read = f.read_to_end(&mut raw);
        fs2::FileExt::unlock(&f)?;
        read?;

        debug!("Read {} bytes from {}", raw.len(), path.display());
        Ok(Some(raw))
    }

    fn write_document(&self, key: &str, bytes: &[u8]) -> Result<(), GuardError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root)?;

        let tmp_path = path.with_extension(format!("{}{}", DOCUMENT_EXTENSION, DOCUMENT_TMP_SUFFIX));
        {
            let mut tmp = OpenOptions::new().create(true).write(true).truncate(true).open(&tmp_path)?;
            fs2::FileExt::lock_exclusive(&tmp)?;
            tmp.write_all(bytes)?;
            tmp.flush()?;
            tmp.sync_all()?;
            fs2::FileExt::unlock(&tmp)?;
        }

        fs::rename(&tmp_path, &path)?;
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}

/// In-process backend, used for embedding and tests.
///
/// `fail_next_writes` and `fail_next_reads` make the next N writes or reads fail with
/// an I/O error, which is how the retry, rollback and degraded-load paths are exercised.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    documents: RwLock<HashMap<String, Vec<u8>>>,
    failing_writes: AtomicU32,
    failing_reads: AtomicU32,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a raw document, bypassing any failure injection.
    pub fn insert_raw(&self, key: &str, bytes: impl Into<Vec<u8>>) {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), bytes.into());
    }

    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }
}

/// Consumes one pending injected failure, if any.
fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl DocumentBackend for MemoryBackend {
    fn read_document(&self, key: &str) -> Result<Option<Vec<u8>>, GuardError> {
        if take_failure(&self.failing_reads) {
            return Err(GuardError::Io(io::Error::new(io::ErrorKind::Other, "injected read failure")));
        }
        Ok(self.raw(key))
    }

    fn write_document(&self, key: &str, bytes: &[u8]) -> Result<(), GuardError> {
        if take_failure(&self.failing_writes) {
            return Err(GuardError::Io(io::Error::new(io::ErrorKind::Other, "injected write failure")));
        }
        self.insert_raw(key, bytes);
        Ok(())
    }
}

/// Writes a document, retrying transient failures according to `policy`.
pub fn write_with_retry(
    backend: &dyn DocumentBackend,
    key: &str,
    bytes: &[u8],
    policy: &PersistenceConfig,
) -> Result<(), GuardError> {
    let attempts = policy.retry_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match backend.write_document(key, bytes) {
            Ok(()) => {
                if attempt > 1 {
                    debug!("Document '{}' persisted on attempt {}.", key, attempt);
                }
                return Ok(());
            }
            Err(e) => {
                warn!("Attempt {}/{} to persist document '{}' failed: {}", attempt, attempts, key, e);
                last_error = e.to_string();
                if attempt < attempts && policy.retry_delay_ms > 0 {
                    std::thread::sleep(Duration::from_millis(policy.retry_delay_ms));
                }
            }
        }
    }

    error!("Giving up on document '{}' after {} attempt(s).", key, attempts);
    Err(GuardError::PersistenceFailed {
        key: key.to_string(),
        attempts,
        message: last_error,
    })
}
