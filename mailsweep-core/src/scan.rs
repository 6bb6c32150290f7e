//! Per-candidate scan results and run statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Why a candidate could not be scanned
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    /// Connection, TLS, timeout or redirect failure
    #[error("network error: {0}")]
    Network(String),

    /// Every candidate URL answered with something other than 200
    #[error("unexpected status {0}")]
    Status(u16),

    /// The body could not be read
    #[error("body error: {0}")]
    Body(String),
}

/// Outcome classification for one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStatus {
    /// At least one address was found
    Success,
    /// The page was fetched but contained no addresses
    NoEmails,
    /// The page could not be fetched
    Error(FetchFailure),
}

/// Result of scanning one candidate domain.
///
/// Produced per candidate, folded into the run statistics and discarded.
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// URL that answered, or the candidate itself on failure
    pub url: String,
    /// Addresses found on the page, deduplicated
    pub emails: BTreeSet<String>,
    pub status: ScanStatus,
}

impl ScanResult {
    /// Classify a fetched page by whether it yielded addresses
    pub fn fetched(url: impl Into<String>, emails: BTreeSet<String>) -> Self {
        let status = if emails.is_empty() {
            ScanStatus::NoEmails
        } else {
            ScanStatus::Success
        };
        Self {
            url: url.into(),
            emails,
            status,
        }
    }

    pub fn failed(url: impl Into<String>, failure: FetchFailure) -> Self {
        Self {
            url: url.into(),
            emails: BTreeSet::new(),
            status: ScanStatus::Error(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ScanStatus::Success
    }
}

/// Run counters.
///
/// Every counter is monotonically non-decreasing for the life of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub sites_checked: u64,
    pub sites_with_emails: u64,
    /// Sum of per-page address counts (not unique across pages)
    pub emails_found: u64,
    pub sites_processed: u64,
    /// Search hits that survived the existence filter
    pub search_sites_found: u64,
    pub start_time: DateTime<Utc>,
}

impl Statistics {
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            sites_checked: 0,
            sites_with_emails: 0,
            emails_found: 0,
            sites_processed: 0,
            search_sites_found: 0,
            start_time,
        }
    }

    /// Fold one scan result into the counters
    pub fn record(&mut self, result: &ScanResult) {
        self.sites_checked += 1;
        self.sites_processed += 1;
        if result.is_success() {
            self.sites_with_emails += 1;
            self.emails_found += result.emails.len() as u64;
        }
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}
