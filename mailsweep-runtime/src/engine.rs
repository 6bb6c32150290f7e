//! Scan Engine
//!
//! Drives one run through its phases:
//!
//! ```text
//! Idle → Discovering → Filtering → Scanning → Draining → Finished
//! ```
//!
//! A run that ends up with no verified candidates goes to `Failed` instead
//! of `Scanning`. [`ScanEngine::stop`] is cooperative: nothing new is
//! dispatched, in-flight scans finish, and a final snapshot is written.

use parking_lot::Mutex;
use reqwest::Client;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    DiscoveryConfig, DomainDiscovery, OutputConfig, ProgressPersister, SiteScanner, StatsStore, WorkQueue,
    WorkerHandle, WorkerPool,
};
use mailsweep_core::{DomainSet, Statistics};
use mailsweep_net::{
    create_client, DiscoveryProvider, ExistenceFilter, FetchExtractor, FetchSettings, NetError, ProxyConfig,
    ProxyManager, Resolver, SystemResolver,
};

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on concurrent page fetches
    pub max_workers: usize,
    pub proxy: ProxyConfig,
    pub fetch: FetchSettings,
    pub discovery: DiscoveryConfig,
    pub output: OutputConfig,
    /// Timeout for one existence check
    pub resolve_timeout: Duration,
    /// Monitor loop period
    pub poll_interval: Duration,
    /// Snapshot every this many processed sites
    pub persist_every: u64,
    /// Upper bound on search hits per run
    pub search_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 20,
            proxy: ProxyConfig::default(),
            fetch: FetchSettings::default(),
            discovery: DiscoveryConfig::default(),
            output: OutputConfig::default(),
            resolve_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
            persist_every: 10,
            search_cap: 200,
        }
    }
}

/// Run phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Discovering,
    Filtering,
    Scanning,
    Draining,
    Finished,
    /// Terminal error, with the reason
    Failed(String),
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Idle => write!(f, "idle"),
            EngineState::Discovering => write!(f, "discovering"),
            EngineState::Filtering => write!(f, "filtering"),
            EngineState::Scanning => write!(f, "scanning"),
            EngineState::Draining => write!(f, "draining"),
            EngineState::Finished => write!(f, "finished"),
            EngineState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine has already been started")]
    AlreadyStarted,

    #[error("no existing domains found")]
    NoCandidates,

    #[error(transparent)]
    Net(#[from] NetError),
}

/// What a finished run did
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub statistics: Statistics,
    pub unique_emails: usize,
    /// Verified candidates queued for scanning
    pub candidates: usize,
    /// Candidates handed to a worker
    pub dispatched: usize,
    pub elapsed: Duration,
    /// Whether the run ended through [`ScanEngine::stop`]
    pub stopped: bool,
}

impl RunSummary {
    fn log(&self) {
        info!("Scan complete");
        info!("  Sites checked: {}", self.statistics.sites_checked);
        info!("  Sites from search: {}", self.statistics.search_sites_found);
        info!("  Sites with emails: {}", self.statistics.sites_with_emails);
        info!("  Total emails: {}", self.statistics.emails_found);
        info!("  Unique emails: {}", self.unique_emails);
        info!("  Elapsed: {:.1}s", self.elapsed.as_secs_f64());
    }
}

/// The mass scanning engine. One instance drives a single run.
pub struct ScanEngine {
    config: EngineConfig,
    proxies: ProxyManager,
    resolver: Arc<dyn Resolver>,
    providers: Option<Vec<Arc<dyn DiscoveryProvider>>>,
    scanner: Option<Arc<dyn SiteScanner>>,
    stats: Arc<StatsStore>,
    state: Mutex<EngineState>,
    cancel: CancellationToken,
}

impl ScanEngine {
    pub fn new(config: EngineConfig) -> Self {
        let stats = Arc::new(StatsStore::new(Some(config.output.emails_path())));
        Self {
            proxies: ProxyManager::new(config.proxy.clone()),
            resolver: Arc::new(SystemResolver),
            providers: None,
            scanner: None,
            stats,
            state: Mutex::new(EngineState::Idle),
            cancel: CancellationToken::new(),
            config,
        }
    }

    /// Replace the system DNS resolver
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replace the search engine providers built from the configuration
    pub fn with_providers(mut self, providers: Vec<Arc<dyn DiscoveryProvider>>) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Replace the HTTP page scanner
    pub fn with_scanner(mut self, scanner: Arc<dyn SiteScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state.lock().clone()
    }

    /// Counter snapshot; safe to poll from any thread
    pub fn stats(&self) -> Statistics {
        self.stats.snapshot()
    }

    /// Unique addresses found so far, sorted
    pub fn found_emails(&self) -> Vec<String> {
        self.stats.found_emails()
    }

    /// Request a cooperative stop
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!("Stop requested, finishing in-flight sites");
            self.cancel.cancel();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn set_state(&self, state: EngineState) {
        *self.state.lock() = state;
    }

    fn fail(&self, reason: &str) {
        error!("Scan failed: {}", reason);
        self.set_state(EngineState::Failed(reason.to_string()));
    }

    /// Run a scan of up to `total_sites` candidates.
    ///
    /// With a non-empty `search_query`, search hits are used first and
    /// topped up from the domain sources. Without one, candidates come from
    /// the sources alone.
    pub async fn run(&self, total_sites: usize, search_query: Option<&str>) -> Result<RunSummary, EngineError> {
        {
            let mut state = self.state.lock();
            if *state != EngineState::Idle {
                return Err(EngineError::AlreadyStarted);
            }
            *state = EngineState::Discovering;
        }

        let started = Instant::now();
        info!("🚀 Starting mass scan of {} sites", total_sites);

        let proxy = self.proxies.acquire().await;
        if proxy.is_none() {
            info!("Running without proxy");
        }

        let client = match create_client(proxy.as_ref(), self.config.discovery.request_timeout) {
            Ok(client) => client,
            Err(e) => {
                self.fail(&e.to_string());
                return Err(e.into());
            }
        };

        let query = search_query.map(str::trim).filter(|q| !q.is_empty());
        let candidates = self.collect_candidates(&client, total_sites, query).await;
        let persister = ProgressPersister::new(self.config.output.progress_path(), self.config.persist_every);

        if candidates.is_empty() && !self.cancel.is_cancelled() {
            self.fail("no existing domains found");
            persister.persist(&self.stats);
            return Err(EngineError::NoCandidates);
        }

        info!("Found {} existing domains", candidates.len());
        let candidate_count = candidates.len();
        let queue = Arc::new(WorkQueue::new(candidates));

        let dispatched = if self.cancel.is_cancelled() {
            self.set_state(EngineState::Draining);
            persister.persist(&self.stats);
            0
        } else {
            self.set_state(EngineState::Scanning);
            self.scan(&client, Arc::clone(&queue), persister).await
        };

        let summary = RunSummary {
            statistics: self.stats.snapshot(),
            unique_emails: self.stats.unique_emails(),
            candidates: candidate_count,
            dispatched,
            elapsed: started.elapsed(),
            stopped: self.cancel.is_cancelled(),
        };
        summary.log();
        self.set_state(EngineState::Finished);
        Ok(summary)
    }

    async fn scan(&self, client: &Client, queue: Arc<WorkQueue>, mut persister: ProgressPersister) -> usize {
        let scanner: Arc<dyn SiteScanner> = match &self.scanner {
            Some(scanner) => Arc::clone(scanner),
            None => Arc::new(FetchExtractor::new(client.clone(), self.config.fetch.clone())),
        };

        let workers = self.config.max_workers.min(queue.total()).max(1);
        info!("Starting {} workers", workers);

        let pool = WorkerPool::spawn(
            workers,
            WorkerHandle {
                queue: Arc::clone(&queue),
                scanner,
                stats: Arc::clone(&self.stats),
                cancel: self.cancel.clone(),
            },
        );

        let total = queue.total() as u64;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            if persister.maybe_persist(&self.stats) {
                let stats = self.stats.snapshot();
                info!(
                    "Progress: {}/{} sites, {} unique emails",
                    stats.sites_processed,
                    total,
                    self.stats.unique_emails()
                );
            }

            if self.stats.processed() >= total || pool.is_finished() {
                break;
            }
        }

        self.set_state(EngineState::Draining);
        let processed = pool.join().await;
        if self.cancel.is_cancelled() {
            warn!("Scan stopped after {} of {} sites", processed, total);
        }

        persister.persist(&self.stats);
        queue.dispatched()
    }

    /// Discover and verify up to `total` candidates
    async fn collect_candidates(&self, client: &Client, total: usize, query: Option<&str>) -> Vec<String> {
        let discovery = match &self.providers {
            Some(providers) => DomainDiscovery::with_providers(providers.clone(), self.config.discovery.clone()),
            None => DomainDiscovery::new(self.config.discovery.clone()),
        };
        let filter = ExistenceFilter::new(
            Arc::clone(&self.resolver),
            self.config.max_workers,
            self.config.resolve_timeout,
        );

        let Some(query) = query else {
            let pool = discovery.load_from_sources(client, total.saturating_mul(2)).await;
            if self.cancel.is_cancelled() {
                return Vec::new();
            }
            self.set_state(EngineState::Filtering);
            info!("Checking {} domains for existence", pool.len());
            return filter.find_existing(&pool, total).await;
        };

        let search_max = self.config.search_cap.min(total);
        let hits = discovery.search_by_query(client, query, search_max).await;
        if self.cancel.is_cancelled() {
            return Vec::new();
        }

        self.set_state(EngineState::Filtering);
        let verified = filter.find_existing(&hits.domains, search_max).await;
        self.stats.set_search_sites_found(verified.len() as u64);
        info!("Search produced {} existing sites", verified.len());

        let mut candidates = DomainSet::new(total);
        if candidates.extend(verified) || self.cancel.is_cancelled() {
            return candidates.into_vec();
        }

        let remaining = candidates.remaining();
        self.set_state(EngineState::Discovering);
        let pool = discovery.load_from_sources(client, remaining.saturating_mul(2)).await;
        if self.cancel.is_cancelled() {
            return candidates.into_vec();
        }

        self.set_state(EngineState::Filtering);
        let pool: Vec<String> = pool
            .into_iter()
            .filter(|d| !candidates.as_slice().contains(d))
            .collect();
        candidates.extend(filter.find_existing(&pool, remaining).await);
        candidates.into_vec()
    }
}
