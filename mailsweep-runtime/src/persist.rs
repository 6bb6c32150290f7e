//! Durable run output
//!
//! The found-email list and the JSON progress snapshot are both written by
//! replacing the target with a fully written temp file from the same
//! directory, so readers never observe a half-written file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, error};

use crate::StatsStore;
use mailsweep_core::Statistics;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Where run output lands
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Sorted, deduplicated emails, one per line
    pub emails_file: String,
    /// JSON progress snapshot
    pub progress_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            emails_file: "found_emails.txt".to_string(),
            progress_file: "scan_progress.json".to_string(),
        }
    }
}

impl OutputConfig {
    pub fn emails_path(&self) -> PathBuf {
        self.dir.join(&self.emails_file)
    }

    pub fn progress_path(&self) -> PathBuf {
        self.dir.join(&self.progress_file)
    }
}

/// Replace `path` with `content` via a temp file in the same directory
pub fn write_atomic(path: &Path, content: &str) -> Result<(), PersistError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(path).map_err(|e| PersistError::Io(e.error))?;
    Ok(())
}

/// Write the email list, one address per line in sorted order
pub fn write_email_file(path: &Path, emails: &BTreeSet<String>) -> Result<(), PersistError> {
    let mut content = String::new();
    for email in emails {
        content.push_str(email);
        content.push('\n');
    }
    write_atomic(path, &content)
}

/// Full progress snapshot as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub statistics: Statistics,
    pub emails_found: Vec<String>,
    pub last_update: DateTime<Utc>,
}

impl ProgressSnapshot {
    /// Capture the current state of a store
    pub fn capture(stats: &StatsStore) -> Self {
        Self {
            statistics: stats.snapshot(),
            emails_found: stats.found_emails(),
            last_update: Utc::now(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, PersistError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, &json)
    }
}

/// Writes a snapshot each time the processed count advances by `every`.
///
/// Driven by the engine's monitor loop rather than its own timer.
#[derive(Debug)]
pub struct ProgressPersister {
    path: PathBuf,
    every: u64,
    last_count: u64,
}

impl ProgressPersister {
    pub fn new(path: PathBuf, every: u64) -> Self {
        Self {
            path,
            every: every.max(1),
            last_count: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist if at least `every` sites were processed since the last write.
    ///
    /// Returns true when a snapshot was attempted.
    pub fn maybe_persist(&mut self, stats: &StatsStore) -> bool {
        let processed = stats.processed();
        if processed < self.last_count + self.every {
            return false;
        }
        self.last_count = processed;
        self.persist(stats);
        true
    }

    /// Unconditionally persist. Failures are logged, never propagated.
    pub fn persist(&self, stats: &StatsStore) {
        match ProgressSnapshot::capture(stats).save(&self.path) {
            Ok(()) => debug!("Progress saved to {}", self.path.display()),
            Err(e) => error!("Failed to save progress to {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailsweep_core::ScanResult;
    use tempfile::tempdir;

    fn page(url: &str, emails: &[&str]) -> ScanResult {
        ScanResult::fetched(url, emails.iter().map(|e| e.to_string()).collect())
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");

        write_atomic(&path, "first").unwrap();
        write_atomic(&path, "second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        // Only the target remains, no stray temp files.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_atomic_creates_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.txt");
        write_atomic(&path, "x").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_email_file_sorted_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("emails.txt");
        let emails: BTreeSet<String> = ["z@b.com", "a@b.com"].iter().map(|s| s.to_string()).collect();

        write_email_file(&path, &emails).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a@b.com\nz@b.com\n");
    }

    #[test]
    fn test_persister_threshold() {
        let dir = tempdir().unwrap();
        let stats = StatsStore::new(None);
        let mut persister = ProgressPersister::new(dir.path().join("progress.json"), 10);

        for i in 0..9 {
            stats.record(&page(&format!("https://s{}.com", i), &[]));
        }
        assert!(!persister.maybe_persist(&stats));
        assert!(!persister.path().exists());

        stats.record(&page("https://s9.com", &["hi@s9.com"]));
        assert!(persister.maybe_persist(&stats));
        assert!(!persister.maybe_persist(&stats));

        let snapshot = ProgressSnapshot::load(persister.path()).unwrap();
        assert_eq!(snapshot.statistics.sites_processed, 10);
        assert_eq!(snapshot.emails_found, vec!["hi@s9.com"]);
    }

    #[test]
    fn test_persist_failure_is_not_fatal() {
        let dir = tempdir().unwrap();
        // A directory squatting on the target path makes the rename fail.
        let path = dir.path().join("progress.json");
        fs::create_dir(&path).unwrap();

        let persister = ProgressPersister::new(path, 10);
        persister.persist(&StatsStore::new(None));
    }
}
