//! Shared run statistics and found-email set

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{error, info};

use crate::persist::write_email_file;
use mailsweep_core::{ScanResult, Statistics};

/// Aggregates scan results from every worker.
///
/// Counters and the email set sit behind separate locks. The counter lock is
/// taken on every result; the email lock only on success, and is held while
/// the full set is written through to `email_file`.
#[derive(Debug)]
pub struct StatsStore {
    counters: Mutex<Statistics>,
    emails: Mutex<BTreeSet<String>>,
    email_file: Option<PathBuf>,
}

impl StatsStore {
    /// New store. With `email_file` set, every new address triggers a rewrite
    /// of that file.
    pub fn new(email_file: Option<PathBuf>) -> Self {
        Self {
            counters: Mutex::new(Statistics::default()),
            emails: Mutex::new(BTreeSet::new()),
            email_file,
        }
    }

    /// Fold one result in. Returns the number of previously unseen addresses.
    pub fn record(&self, result: &ScanResult) -> usize {
        self.counters.lock().record(result);

        if !result.is_success() {
            return 0;
        }

        info!("Found {} emails on {}", result.emails.len(), result.url);

        let mut emails = self.emails.lock();
        let mut added = 0;
        for email in &result.emails {
            if emails.insert(email.clone()) {
                info!("  📧 {}", email);
                added += 1;
            }
        }

        if added > 0 {
            if let Some(path) = &self.email_file {
                if let Err(e) = blocking_io(|| write_email_file(path, &emails)) {
                    error!("Failed to write {}: {}", path.display(), e);
                }
            }
        }

        added
    }

    pub fn set_search_sites_found(&self, count: u64) {
        self.counters.lock().search_sites_found = count;
    }

    /// Copy of the counters
    pub fn snapshot(&self) -> Statistics {
        self.counters.lock().clone()
    }

    pub fn processed(&self) -> u64 {
        self.counters.lock().sites_processed
    }

    /// All unique addresses found so far, sorted
    pub fn found_emails(&self) -> Vec<String> {
        self.emails.lock().iter().cloned().collect()
    }

    pub fn unique_emails(&self) -> usize {
        self.emails.lock().len()
    }
}

/// Run file I/O from a worker without stalling the other tasks on its
/// runtime thread. Plain call outside a multi-thread runtime, where
/// `block_in_place` is unavailable.
fn blocking_io<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => tokio::task::block_in_place(f),
        _ => f(),
    }
}

impl Default for StatsStore {
    fn default() -> Self {
        Self::new(None)
    }
}
