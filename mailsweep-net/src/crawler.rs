//! Search engine crawler
//!
//! Queries web search engines and public directories and extracts candidate
//! domains from the result pages.

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::{random_user_agent, ACCEPT_HTML};
use mailsweep_core::{extract_domain, DomainSet, ResultLayout, SearchEngine};

/// Errors from a single discovery strategy
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unexpected status {0}")]
    Status(u16),
}

/// A source of candidate domains for a free-text query
#[async_trait]
pub trait DiscoveryProvider: Send + Sync {
    /// Strategy name, for logging
    fn name(&self) -> &str;

    /// Relative weight biasing how early this strategy is tried
    fn weight(&self) -> u32;

    /// Return up to `max_results` unique domains
    async fn discover(
        &self,
        client: &Client,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<String>, DiscoveryError>;
}

/// Discovery through one search engine's HTML result page
#[derive(Debug, Clone)]
pub struct SearchEngineProvider {
    engine: SearchEngine,
    timeout: Duration,
}

impl SearchEngineProvider {
    pub fn new(engine: SearchEngine, timeout: Duration) -> Self {
        Self { engine, timeout }
    }
}

#[async_trait]
impl DiscoveryProvider for SearchEngineProvider {
    fn name(&self) -> &str {
        &self.engine.name
    }

    fn weight(&self) -> u32 {
        self.engine.weight
    }

    async fn discover(
        &self,
        client: &Client,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<String>, DiscoveryError> {
        let url = self.engine.build_url(query, max_results);
        debug!("Crawling {} with query: {}", self.engine.name, query);

        let mut request = client
            .get(&url)
            .timeout(self.timeout)
            .header(USER_AGENT, random_user_agent())
            .header(ACCEPT, ACCEPT_HTML)
            .header(ACCEPT_LANGUAGE, self.engine.accept_language.as_str());
        if let Some(referer) = &self.engine.referer {
            request = request.header(REFERER, referer.as_str());
        }

        let response = request.send().await?;
        if response.status() != StatusCode::OK {
            return Err(DiscoveryError::Status(response.status().as_u16()));
        }

        let html = response.text().await?;
        let domains = parse_search_results(&html, self.engine.layout, &self.engine.exclude, max_results);

        debug!("Engine {} returned {} domains", self.engine.name, domains.len());
        Ok(domains)
    }
}

static ANCHOR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

static RESULT_URL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.result__url").unwrap());

// Stops at `&` so redirect query strings are not swallowed.
static REDIRECT_FALLBACK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s&]+").unwrap());

static RAW_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s"<>]+"#).unwrap());

static HOST_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://([^/\s"'<>]+)"#).unwrap());

/// Parse candidate domains from a search result page
pub fn parse_search_results(html: &str, layout: ResultLayout, exclude: &str, max: usize) -> Vec<String> {
    let mut found = DomainSet::new(max);
    if found.is_full() {
        return found.into_vec();
    }

    match layout {
        ResultLayout::RedirectAnchors => {
            let document = Html::parse_document(html);
            for element in document.select(&ANCHOR_SELECTOR) {
                let Some(target) = element
                    .value()
                    .attr("href")
                    .and_then(|href| href.strip_prefix("/url?q="))
                else {
                    continue;
                };
                let target = target.split('&').next().unwrap_or(target);
                if let Some(domain) = extract_domain(target) {
                    if found.push(domain) {
                        break;
                    }
                }
            }

            if found.is_empty() {
                scan_raw_urls(html, &REDIRECT_FALLBACK_REGEX, exclude, &mut found);
            }
        }
        ResultLayout::ExternalAnchors => {
            let document = Html::parse_document(html);
            for element in document.select(&ANCHOR_SELECTOR) {
                let Some(href) = element.value().attr("href") else {
                    continue;
                };
                if !href.starts_with("http") || (!exclude.is_empty() && href.contains(exclude)) {
                    continue;
                }
                if let Some(domain) = extract_domain(href) {
                    if found.push(domain) {
                        break;
                    }
                }
            }
        }
        ResultLayout::RawUrls => {
            scan_raw_urls(html, &RAW_URL_REGEX, exclude, &mut found);
        }
        ResultLayout::ResultUrlText => {
            let document = Html::parse_document(html);
            for element in document.select(&RESULT_URL_SELECTOR) {
                let text = element.text().collect::<String>();
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                if let Some(domain) = extract_domain(text) {
                    if found.push(domain) {
                        break;
                    }
                }
            }
        }
    }

    found.into_vec()
}

fn scan_raw_urls(html: &str, pattern: &Regex, exclude: &str, found: &mut DomainSet) {
    for link in pattern.find_iter(html) {
        let link = link.as_str();
        if !exclude.is_empty() && link.contains(exclude) {
            continue;
        }
        if let Some(domain) = extract_domain(link) {
            if found.push(domain) {
                break;
            }
        }
    }
}

/// Pull host names out of a public directory listing
pub fn parse_directory_hosts(html: &str, exclude: &str, max: usize) -> Vec<String> {
    let mut found = DomainSet::new(max);
    if found.is_full() {
        return found.into_vec();
    }

    for cap in HOST_REGEX.captures_iter(html) {
        let Some(host) = cap.get(1).map(|m| m.as_str()) else {
            continue;
        };
        if host.is_empty() || (!exclude.is_empty() && host.contains(exclude)) {
            continue;
        }
        let host = host.strip_prefix("www.").unwrap_or(host).to_lowercase();
        if found.push(host) {
            break;
        }
    }

    found.into_vec()
}

/// Scrape a public site directory search page for domains
pub async fn scrape_directory(
    client: &Client,
    url_template: &str,
    exclude: &str,
    query: &str,
    max: usize,
    timeout: Duration,
) -> Result<Vec<String>, DiscoveryError> {
    let url = url_template.replace("{query}", &urlencoding::encode(query));
    debug!("Scraping directory: {}", url);

    let response = client
        .get(&url)
        .timeout(timeout)
        .header(USER_AGENT, random_user_agent())
        .header(ACCEPT, ACCEPT_HTML)
        .send()
        .await?;

    if response.status() != StatusCode::OK {
        return Err(DiscoveryError::Status(response.status().as_u16()));
    }

    let html = response.text().await?;
    Ok(parse_directory_hosts(&html, exclude, max))
}
