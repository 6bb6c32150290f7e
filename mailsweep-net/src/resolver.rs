//! Existence filter
//!
//! Concurrent DNS gate applied to candidates before they are queued for
//! fetching. Unresolvable or slow domains are dropped silently.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Hard cap on concurrent resolutions
pub const MAX_RESOLVE_CONCURRENCY: usize = 50;

/// Answers whether a domain resolves
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolves(&self, domain: &str) -> bool;
}

/// Resolver backed by the system's `getaddrinfo`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolves(&self, domain: &str) -> bool {
        match tokio::net::lookup_host((domain, 80)).await {
            Ok(mut addrs) => addrs.next().is_some(),
            Err(e) => {
                debug!("Resolution of {} failed: {}", domain, e);
                false
            }
        }
    }
}

/// Bounded-concurrency existence check over a candidate list
#[derive(Clone)]
pub struct ExistenceFilter {
    resolver: Arc<dyn Resolver>,
    concurrency: usize,
    timeout: Duration,
}

impl ExistenceFilter {
    /// Concurrency is `min(50, max_workers)`, never below one
    pub fn new(resolver: Arc<dyn Resolver>, max_workers: usize, timeout: Duration) -> Self {
        Self {
            resolver,
            concurrency: max_workers.clamp(1, MAX_RESOLVE_CONCURRENCY),
            timeout,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Return up to `max_domains` candidates that resolve.
    ///
    /// At most `3 × max_domains` inputs are checked. Results come back in
    /// completion order; checking stops as soon as enough have resolved.
    pub async fn find_existing(&self, domains: &[String], max_domains: usize) -> Vec<String> {
        if max_domains == 0 || domains.is_empty() {
            return Vec::new();
        }

        let limit = domains.len().min(max_domains.saturating_mul(3));
        info!("Checking existence of {} domains", limit);

        let mut checks = stream::iter(domains[..limit].iter().cloned())
            .map(|domain| {
                let resolver = self.resolver.clone();
                let timeout = self.timeout;
                async move {
                    let ok = matches!(
                        tokio::time::timeout(timeout, resolver.resolves(&domain)).await,
                        Ok(true)
                    );
                    (domain, ok)
                }
            })
            .buffer_unordered(self.concurrency);

        let mut existing = Vec::new();
        while let Some((domain, ok)) = checks.next().await {
            if !ok {
                continue;
            }
            existing.push(domain);
            if existing.len() % 100 == 0 {
                info!("Existing domains so far: {}", existing.len());
            }
            if existing.len() >= max_domains {
                break;
            }
        }

        info!("Found {} existing domains", existing.len());
        existing
    }
}
