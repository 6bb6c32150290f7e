//! Candidate discovery
//!
//! Two ways to fill the candidate pool:
//! - [`DomainDiscovery::search_by_query`] asks every discovery provider in a
//!   weighted random order, falling back to keyword guesses and a directory
//!   scrape when nothing turns up
//! - [`DomainDiscovery::load_from_sources`] merges a local list, remote lists
//!   and generated filler

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use reqwest::Client;
use std::io;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use mailsweep_core::{
    default_search_engines, generate_domains, keyword_domains, parse_domain_list, DomainSet,
    SearchEngine,
};
use mailsweep_net::{
    fetch_domain_list, scrape_directory, DiscoveryError, DiscoveryProvider, SearchEngineProvider,
    DEFAULT_DOMAIN_LISTS,
};

/// Discovery configuration
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub engines: Vec<SearchEngine>,
    /// Timeout for one engine or directory request
    pub request_timeout: Duration,
    /// Random pause between two providers
    pub strategy_delay: RangeInclusive<Duration>,
    /// TLDs combined with query words by the backup path
    pub backup_tlds: Vec<String>,
    /// Directory search URL with a `{query}` placeholder
    pub directory_url: Option<String>,
    /// Substring marking the directory's own links
    pub directory_exclude: String,
    /// Remote plain-text domain lists
    pub domain_lists: Vec<String>,
    pub list_timeout: Duration,
    /// Local domain list read first when present
    pub local_override: Option<PathBuf>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            engines: default_search_engines(),
            request_timeout: Duration::from_secs(15),
            strategy_delay: Duration::from_millis(1000)..=Duration::from_millis(3000),
            backup_tlds: ["com", "net", "org", "ru", "ua", "kz", "by"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            directory_url: Some("http://www.dmoz.org/search?q={query}".to_string()),
            directory_exclude: "dmoz".to_string(),
            domain_lists: DEFAULT_DOMAIN_LISTS.iter().map(|s| s.to_string()).collect(),
            list_timeout: Duration::from_secs(10),
            local_override: Some(PathBuf::from("domains.txt")),
        }
    }
}

/// A provider that failed during a search
#[derive(Debug)]
pub struct StrategyFailure {
    pub strategy: String,
    pub error: DiscoveryError,
}

/// Outcome of a query search
#[derive(Debug, Default)]
pub struct DiscoveryResult {
    /// Unique domains in discovery order
    pub domains: Vec<String>,
    /// Providers that errored; the others still ran
    pub failures: Vec<StrategyFailure>,
    /// Whether the keyword/directory fallback produced the domains
    pub used_backup: bool,
}

/// Weighted random permutation of `0..weights.len()`.
///
/// Heavier entries tend to come first. Zero weights count as one.
pub fn weighted_order<R: Rng + ?Sized>(weights: &[u32], rng: &mut R) -> Vec<usize> {
    let mut remaining: Vec<usize> = (0..weights.len()).collect();
    let mut order = Vec::with_capacity(weights.len());

    while !remaining.is_empty() {
        let picked = match WeightedIndex::new(remaining.iter().map(|&i| weights[i].max(1))) {
            Ok(dist) => dist.sample(rng),
            Err(_) => 0,
        };
        order.push(remaining.remove(picked));
    }

    order
}

fn random_delay(range: &RangeInclusive<Duration>) -> Duration {
    let (min, max) = (*range.start(), *range.end());
    if max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..=max)
}

/// Domain discovery over a set of providers
pub struct DomainDiscovery {
    providers: Vec<Arc<dyn DiscoveryProvider>>,
    config: DiscoveryConfig,
}

impl DomainDiscovery {
    /// One search engine provider per configured engine
    pub fn new(config: DiscoveryConfig) -> Self {
        let providers = config
            .engines
            .iter()
            .map(|engine| {
                Arc::new(SearchEngineProvider::new(engine.clone(), config.request_timeout))
                    as Arc<dyn DiscoveryProvider>
            })
            .collect();
        Self { providers, config }
    }

    /// Use the given providers instead of the configured engines
    pub fn with_providers(providers: Vec<Arc<dyn DiscoveryProvider>>, config: DiscoveryConfig) -> Self {
        Self { providers, config }
    }

    /// Collect up to `max_results` domains for a query
    pub async fn search_by_query(&self, client: &Client, query: &str, max_results: usize) -> DiscoveryResult {
        info!("Searching for sites matching: {}", query);

        let weights: Vec<u32> = self.providers.iter().map(|p| p.weight()).collect();
        let order = weighted_order(&weights, &mut rand::thread_rng());

        let mut found = DomainSet::new(max_results);
        let mut failures = Vec::new();

        for (attempt, index) in order.into_iter().enumerate() {
            if found.is_full() {
                break;
            }
            if attempt > 0 {
                tokio::time::sleep(random_delay(&self.config.strategy_delay)).await;
            }

            let provider = &self.providers[index];
            info!("Trying {}...", provider.name());

            match provider.discover(client, query, found.remaining()).await {
                Ok(domains) => {
                    info!("{} returned {} domains", provider.name(), domains.len());
                    found.extend(domains);
                }
                Err(e) => {
                    warn!("{} search failed: {}", provider.name(), e);
                    failures.push(StrategyFailure {
                        strategy: provider.name().to_string(),
                        error: e,
                    });
                }
            }
        }

        if !found.is_empty() {
            info!("Search found {} unique domains", found.len());
            return DiscoveryResult {
                domains: found.into_vec(),
                failures,
                used_backup: false,
            };
        }

        warn!("Search engines returned nothing, using backup discovery");
        DiscoveryResult {
            domains: self.backup_discovery(client, query, max_results).await,
            failures,
            used_backup: true,
        }
    }

    /// Keyword × TLD guesses plus one directory scrape
    pub async fn backup_discovery(&self, client: &Client, query: &str, max_results: usize) -> Vec<String> {
        let tlds: Vec<&str> = self.config.backup_tlds.iter().map(String::as_str).collect();
        let mut found = DomainSet::new(max_results);
        found.extend(keyword_domains(query, &tlds, max_results));

        if let Some(url) = &self.config.directory_url {
            if !found.is_full() {
                match scrape_directory(
                    client,
                    url,
                    &self.config.directory_exclude,
                    query,
                    found.remaining(),
                    self.config.request_timeout,
                )
                .await
                {
                    Ok(hosts) => {
                        debug!("Directory returned {} hosts", hosts.len());
                        found.extend(hosts);
                    }
                    Err(e) => debug!("Directory scrape failed: {}", e),
                }
            }
        }

        info!("Backup discovery produced {} domains", found.len());
        found.into_vec()
    }

    /// Up to `max_domains` candidates from the local list, remote lists and
    /// generated filler, in that order
    pub async fn load_from_sources(&self, client: &Client, max_domains: usize) -> Vec<String> {
        let mut found = DomainSet::new(max_domains);
        if found.is_full() {
            return found.into_vec();
        }

        if let Some(path) = &self.config.local_override {
            match tokio::fs::read_to_string(path).await {
                Ok(text) => {
                    let before = found.len();
                    found.extend(parse_domain_list(&text));
                    info!("Loaded {} domains from {}", found.len() - before, path.display());
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("No local domain list at {}", path.display());
                }
                Err(e) => warn!("Failed to read {}: {}", path.display(), e),
            }
        }

        for url in &self.config.domain_lists {
            if found.is_full() {
                break;
            }
            match fetch_domain_list(client, url, found.remaining(), self.config.list_timeout).await {
                Ok(domains) => {
                    info!("Loaded {} domains from {}", domains.len(), url);
                    found.extend(domains);
                }
                Err(e) => warn!("Failed to load domain list {}: {}", url, e),
            }
        }

        if !found.is_full() {
            let before = found.len();
            found.extend(generate_domains(max_domains));
            info!("Generated {} domains", found.len() - before);
        }

        found.into_vec()
    }
}
