// src/ledger.rs
//! Dedup ledger: the durable set of filing identifiers already handled.
//!
//! The in-memory set answers `has`; every new identifier is written through
//! the injected [`LedgerStore`] before `mark` returns, so a restart replays
//! exactly what was marked. The ledger only grows.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::errors::{MonitorError, MonitorResult};

/// Storage behind the ledger. `append` must be durable when it returns.
pub trait LedgerStore: Send {
    fn load(&mut self) -> io::Result<Vec<String>>;
    fn append(&mut self, id: &str) -> io::Result<()>;
}

/// Newline-delimited identifier log, fsynced per append.
///
/// Also reads the older whole-file JSON array layout and rewrites it as a
/// line log on first load.
pub struct FileLedgerStore {
    path: PathBuf,
    file: Option<File>,
}

impl FileLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_for_append(&mut self) -> io::Result<&mut File> {
        if self.file.is_none() {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let mut f = OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(&self.path)?;
            // A crash mid-append can leave a torn last line; never glue onto it.
            let len = f.metadata()?.len();
            if len > 0 {
                f.seek(SeekFrom::End(-1))?;
                let mut last = [0u8; 1];
                f.read_exact(&mut last)?;
                if last[0] != b'\n' {
                    f.write_all(b"\n")?;
                    f.sync_all()?;
                }
            }
            self.file = Some(f);
        }
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("ledger file not open"))
    }

    fn rewrite_as_lines(&self, ids: &[String]) -> io::Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)?;
            for id in ids {
                writeln!(f, "{id}")?;
            }
            f.sync_all()?;
        }
        fs::rename(tmp, &self.path)
    }
}

impl LedgerStore for FileLedgerStore {
    fn load(&mut self) -> io::Result<Vec<String>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        if content.trim_start().starts_with('[') {
            let ids: Vec<String> = serde_json::from_str(&content)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let ids: Vec<String> = ids
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            self.rewrite_as_lines(&ids)?;
            tracing::info!(
                target: "ledger",
                path = %self.path.display(),
                entries = ids.len(),
                "migrated JSON ledger to line log"
            );
            return Ok(ids);
        }

        Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    fn append(&mut self, id: &str) -> io::Result<()> {
        if id.contains(['\n', '\r']) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "identifier contains a line break",
            ));
        }
        let f = self.open_for_append()?;
        f.write_all(format!("{id}\n").as_bytes())?;
        f.sync_all()
    }
}

/// Volatile store for tests and dry runs. Clones share the same entries.
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    pub entries: Arc<Mutex<Vec<String>>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&mut self) -> io::Result<Vec<String>> {
        let guard = self
            .entries
            .lock()
            .map_err(|_| io::Error::other("ledger mutex poisoned"))?;
        Ok(guard.clone())
    }

    fn append(&mut self, id: &str) -> io::Result<()> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| io::Error::other("ledger mutex poisoned"))?;
        guard.push(id.to_string());
        Ok(())
    }
}

pub struct DedupLedger {
    seen: HashSet<String>,
    store: Box<dyn LedgerStore>,
}

impl DedupLedger {
    /// Replay the store into memory.
    pub fn open<S: LedgerStore + 'static>(mut store: S) -> MonitorResult<Self> {
        let ids = store
            .load()
            .map_err(|e| MonitorError::persistence("ledger load", e))?;
        Ok(Self {
            seen: ids.into_iter().collect(),
            store: Box::new(store),
        })
    }

    pub fn open_file(path: impl Into<PathBuf>) -> MonitorResult<Self> {
        Self::open(FileLedgerStore::new(path))
    }

    pub fn in_memory() -> Self {
        Self {
            seen: HashSet::new(),
            store: Box::new(MemoryLedgerStore::new()),
        }
    }

    pub fn has(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Idempotent. The identifier only counts as seen once it is durable.
    pub fn mark(&mut self, id: &str) -> MonitorResult<()> {
        if self.seen.contains(id) {
            return Ok(());
        }
        self.store
            .append(id)
            .map_err(|e| MonitorError::persistence("ledger append", e))?;
        self.seen.insert(id.to_string());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("seen.log");

        let mut l = DedupLedger::open_file(&path).unwrap();
        assert!(l.is_empty());
        l.mark("0000320193-25-000079").unwrap();
        l.mark("0001045810-25-000200").unwrap();
        l.mark("0000320193-25-000079").unwrap();
        drop(l);

        let l = DedupLedger::open_file(&path).unwrap();
        assert_eq!(l.len(), 2);
        assert!(l.has("0000320193-25-000079"));
        assert!(!l.has("other"));
        let lines = fs::read_to_string(&path).unwrap();
        assert_eq!(lines.lines().count(), 2);
    }

    #[test]
    fn legacy_json_array_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.json");
        fs::write(&path, r#"["https://www.sec.gov/a-index.htm", " ", "b"]"#).unwrap();

        let mut l = DedupLedger::open_file(&path).unwrap();
        assert_eq!(l.len(), 2);
        assert!(l.has("https://www.sec.gov/a-index.htm"));
        l.mark("c").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "https://www.sec.gov/a-index.htm\nb\nc\n");
    }

    #[test]
    fn torn_last_line_is_not_glued() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.log");
        fs::write(&path, "a\nparti").unwrap();

        let mut l = DedupLedger::open_file(&path).unwrap();
        l.mark("b").unwrap();
        let l = DedupLedger::open_file(&path).unwrap();
        assert!(l.has("a"));
        assert!(l.has("b"));
    }

    #[test]
    fn line_breaks_are_rejected() {
        let mut l = DedupLedger::open(FileLedgerStore::new(
            tempfile::tempdir().unwrap().path().join("x.log"),
        ))
        .unwrap();
        let err = l.mark("a\nb").unwrap_err();
        assert!(err.is_persistence());
        assert!(!l.has("a\nb"));
    }

    #[test]
    fn memory_store_is_shared_between_clones() {
        let store = MemoryLedgerStore::new();
        let mut l = DedupLedger::open(store.clone()).unwrap();
        l.mark("x").unwrap();
        assert_eq!(store.entries.lock().unwrap().as_slice(), ["x".to_string()]);
        let l2 = DedupLedger::open(store).unwrap();
        assert!(l2.has("x"));
    }
}
