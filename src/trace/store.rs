//! Trace store — the ordered sequence of thought traces kept as one JSON array on disk.
//!
//! Every operation reads the whole file. [`TraceStore::append`] rewrites it in full
//! under an exclusive advisory lock, writing to a temp file and renaming it into place
//! so readers never observe a half-written array.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use super::types::ThoughtTrace;
use crate::error::{Result, ShadowError};

const MAX_LOCK_RETRIES: usize = 10;
const LOCK_RETRY_MS: u64 = 100;

#[derive(Debug, Clone)]
pub struct TraceStore {
    path: PathBuf,
}

impl TraceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every stored trace in insertion order. A missing or empty file is an
    /// empty store.
    pub fn read_all(&self) -> Result<Vec<ThoughtTrace>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&contents).map_err(|e| ShadowError::CorruptStore {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read_all()?.len())
    }

    /// Append one trace and rewrite the file. Returns the trace's position.
    pub fn append(&self, trace: ThoughtTrace) -> Result<usize> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())?;
        lock_exclusive_with_retry(&lock_file)?;

        let result = self.append_locked(trace);
        FileExt::unlock(&lock_file)?;
        result
    }

    fn append_locked(&self, trace: ThoughtTrace) -> Result<usize> {
        let mut traces = self.read_all()?;
        traces.push(trace);
        let position = traces.len() - 1;

        let json = serde_json::to_vec_pretty(&traces).map_err(|e| {
            std::io::Error::other(format!("serialize traces failed: {e}"))
        })?;

        let tmp_path = self.path.with_extension("json.tmp");
        let mut tmp = std::fs::File::create(&tmp_path)?;
        tmp.write_all(&json)?;
        tmp.sync_all()?;
        drop(tmp);

        std::fs::rename(&tmp_path, &self.path)?;
        Ok(position)
    }

    /// Case-insensitive substring match over `error_signature` and `summary`, in
    /// store order. An empty query matches every trace.
    pub fn search_substring(&self, query: &str) -> Result<Vec<ThoughtTrace>> {
        let needle = query.to_lowercase();
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|t| t.matches_lowercase(&needle))
            .collect())
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "traces".into());
        name.push(".lock");
        self.path.with_file_name(name)
    }
}

fn lock_exclusive_with_retry(file: &std::fs::File) -> std::io::Result<()> {
    for _ in 0..MAX_LOCK_RETRIES {
        match FileExt::try_lock_exclusive(file) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(std::time::Duration::from_millis(LOCK_RETRY_MS));
            }
            Err(e) => return Err(e),
        }
    }
    Err(std::io::Error::new(
        ErrorKind::WouldBlock,
        "trace store: lock timeout",
    ))
}
