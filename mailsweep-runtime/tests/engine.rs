use async_trait::async_trait;
use reqwest::Client;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mailsweep_core::{generate_domains, ScanResult};
use mailsweep_net::{DiscoveryError, DiscoveryProvider, Resolver};
use mailsweep_runtime::{
    DiscoveryConfig, EngineConfig, EngineError, EngineState, OutputConfig, ProgressSnapshot, ScanEngine,
    SiteScanner,
};

struct StubProvider {
    domains: Vec<String>,
}

#[async_trait]
impl DiscoveryProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    fn weight(&self) -> u32 {
        1
    }

    async fn discover(&self, _client: &Client, _query: &str, max: usize) -> Result<Vec<String>, DiscoveryError> {
        Ok(self.domains.iter().take(max).cloned().collect())
    }
}

/// Everything resolves except names starting with `dead`
struct StubResolver {
    resolve_nothing: bool,
}

#[async_trait]
impl Resolver for StubResolver {
    async fn resolves(&self, domain: &str) -> bool {
        !self.resolve_nothing && !domain.starts_with("dead")
    }
}

struct MapScanner {
    pages: HashMap<String, Vec<&'static str>>,
    delay: Duration,
}

#[async_trait]
impl SiteScanner for MapScanner {
    async fn scan(&self, domain: &str) -> ScanResult {
        tokio::time::sleep(self.delay).await;
        let emails: BTreeSet<String> = self
            .pages
            .get(domain)
            .map(|list| list.iter().map(|e| e.to_string()).collect())
            .unwrap_or_default();
        ScanResult::fetched(format!("https://{}", domain), emails)
    }
}

fn offline_config(dir: &Path) -> EngineConfig {
    EngineConfig {
        max_workers: 4,
        discovery: DiscoveryConfig {
            strategy_delay: Duration::ZERO..=Duration::ZERO,
            directory_url: None,
            domain_lists: Vec::new(),
            local_override: None,
            ..DiscoveryConfig::default()
        },
        output: OutputConfig {
            dir: dir.to_path_buf(),
            ..OutputConfig::default()
        },
        poll_interval: Duration::from_millis(20),
        ..EngineConfig::default()
    }
}

fn provider(domains: &[&str]) -> Vec<Arc<dyn DiscoveryProvider>> {
    vec![Arc::new(StubProvider {
        domains: domains.iter().map(|d| d.to_string()).collect(),
    })]
}

fn resolver() -> Arc<dyn Resolver> {
    Arc::new(StubResolver { resolve_nothing: false })
}

fn scanner(pages: &[(&str, Vec<&'static str>)], delay: Duration) -> Arc<dyn SiteScanner> {
    Arc::new(MapScanner {
        pages: pages.iter().map(|(d, e)| (d.to_string(), e.clone())).collect(),
        delay,
    })
}

#[tokio::test]
async fn query_run_scans_verified_search_hits() {
    let dir = tempdir().unwrap();
    let engine = ScanEngine::new(offline_config(dir.path()))
        .with_providers(provider(&["alpha.test", "beta.test", "dead.test", "gamma.test"]))
        .with_resolver(resolver())
        .with_scanner(scanner(
            &[
                ("alpha.test", vec!["a@x.com", "shared@x.com"]),
                ("beta.test", vec!["shared@x.com"]),
            ],
            Duration::ZERO,
        ));

    let summary = engine.run(3, Some("flats")).await.unwrap();

    assert_eq!(engine.state(), EngineState::Finished);
    assert!(!summary.stopped);
    assert_eq!(summary.candidates, 3);
    assert_eq!(summary.dispatched, 3);
    assert_eq!(summary.statistics.sites_processed, 3);
    assert_eq!(summary.statistics.sites_with_emails, 2);
    assert_eq!(summary.statistics.emails_found, 3);
    assert_eq!(summary.statistics.search_sites_found, 2);
    assert_eq!(summary.unique_emails, 2);

    let emails = fs::read_to_string(dir.path().join("found_emails.txt")).unwrap();
    assert_eq!(emails, "a@x.com\nshared@x.com\n");

    let snapshot = ProgressSnapshot::load(&dir.path().join("scan_progress.json")).unwrap();
    assert_eq!(snapshot.statistics.sites_processed, 3);
    assert_eq!(snapshot.statistics.sites_with_emails, 2);
    assert_eq!(snapshot.emails_found, vec!["a@x.com", "shared@x.com"]);
}

#[tokio::test]
async fn run_without_query_uses_generated_domains() {
    let dir = tempdir().unwrap();
    let engine = ScanEngine::new(offline_config(dir.path()))
        .with_providers(provider(&["never.test"]))
        .with_resolver(resolver())
        .with_scanner(scanner(&[], Duration::ZERO));

    let summary = engine.run(5, None).await.unwrap();

    assert_eq!(summary.candidates, 5);
    assert_eq!(summary.statistics.sites_processed, 5);
    assert_eq!(summary.statistics.search_sites_found, 0);
    assert_eq!(summary.unique_emails, 0);
}

#[tokio::test]
async fn blank_query_counts_as_no_query() {
    let dir = tempdir().unwrap();
    let engine = ScanEngine::new(offline_config(dir.path()))
        .with_providers(provider(&["never.test"]))
        .with_resolver(resolver())
        .with_scanner(scanner(&[("never.test", vec!["x@never.test"])], Duration::ZERO));

    let summary = engine.run(2, Some("   ")).await.unwrap();
    assert_eq!(summary.unique_emails, 0);
    assert_eq!(summary.statistics.sites_processed, 2);
}

#[tokio::test]
async fn search_hits_are_topped_up_from_sources() {
    let dir = tempdir().unwrap();
    let engine = ScanEngine::new(offline_config(dir.path()))
        .with_providers(provider(&["one.test"]))
        .with_resolver(resolver())
        .with_scanner(scanner(&[("one.test", vec!["boss@one.test"])], Duration::ZERO));

    let summary = engine.run(4, Some("flats")).await.unwrap();

    assert_eq!(summary.candidates, 4);
    assert_eq!(summary.statistics.search_sites_found, 1);
    assert_eq!(summary.statistics.sites_processed, 4);
    assert_eq!(engine.found_emails(), vec!["boss@one.test"]);
}

#[tokio::test]
async fn no_candidates_fails_the_run() {
    let dir = tempdir().unwrap();
    let engine = ScanEngine::new(offline_config(dir.path()))
        .with_providers(provider(&["alpha.test"]))
        .with_resolver(Arc::new(StubResolver { resolve_nothing: true }))
        .with_scanner(scanner(&[], Duration::ZERO));

    let err = engine.run(5, Some("flats")).await.unwrap_err();

    assert!(matches!(err, EngineError::NoCandidates));
    assert!(matches!(engine.state(), EngineState::Failed(_)));
    assert_eq!(engine.stats().sites_processed, 0);
    assert!(dir.path().join("scan_progress.json").exists());
}

#[tokio::test]
async fn engine_runs_once() {
    let dir = tempdir().unwrap();
    let engine = ScanEngine::new(offline_config(dir.path()))
        .with_providers(provider(&["alpha.test"]))
        .with_resolver(resolver())
        .with_scanner(scanner(&[], Duration::ZERO));

    engine.run(1, Some("flats")).await.unwrap();
    let err = engine.run(1, Some("flats")).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyStarted));
}

#[tokio::test]
async fn stop_mid_run_drains_and_persists() {
    let dir = tempdir().unwrap();
    let domains: Vec<String> = generate_domains(60);
    let domain_refs: Vec<&str> = domains.iter().map(String::as_str).collect();

    let config = EngineConfig {
        max_workers: 2,
        ..offline_config(dir.path())
    };
    let engine = Arc::new(
        ScanEngine::new(config)
            .with_providers(provider(&domain_refs))
            .with_resolver(resolver())
            .with_scanner(scanner(&[], Duration::from_millis(30))),
    );

    let runner = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run(60, Some("flats")).await })
    };

    tokio::time::sleep(Duration::from_millis(150)).await;
    engine.stop();
    let summary = runner.await.unwrap().unwrap();

    assert!(summary.stopped);
    assert_eq!(engine.state(), EngineState::Finished);
    assert_eq!(summary.candidates, 60);
    assert_eq!(summary.statistics.sites_processed, summary.dispatched as u64);
    assert!(summary.dispatched < 60);

    let snapshot = ProgressSnapshot::load(&dir.path().join("scan_progress.json")).unwrap();
    assert_eq!(snapshot.statistics.sites_processed, summary.statistics.sites_processed);
}

#[tokio::test]
async fn full_run_against_mock_sites() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/contacts"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<footer>sales@realty.example <a href="mailto:rent@realty.example">rent</a></footer>"#,
            "text/html",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<p>Nothing here</p>", "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let sites: Vec<String> = ["/contacts", "/about", "/gone"]
        .iter()
        .map(|p| format!("{}{}", server.address(), p))
        .collect();
    let site_refs: Vec<&str> = sites.iter().map(String::as_str).collect();

    let dir = tempdir().unwrap();
    let engine = ScanEngine::new(offline_config(dir.path()))
        .with_providers(provider(&site_refs))
        .with_resolver(resolver());

    let summary = engine.run(3, Some("realty")).await.unwrap();

    assert_eq!(summary.statistics.sites_processed, 3);
    assert_eq!(summary.statistics.sites_with_emails, 1);

    let written: HashSet<String> = fs::read_to_string(dir.path().join("found_emails.txt"))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    let expected: HashSet<String> = ["sales@realty.example", "rent@realty.example"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(written, expected);
}
