//! Proxy credentials and HTTP client construction
//!
//! One proxy is picked at random from the configured pool, validated against
//! an IP-echo service and then shared read-only by every worker for the rest
//! of the run. Without a usable proxy the run falls back to direct
//! connections.

use reqwest::{redirect, Client, Proxy, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from the networking layer
#[derive(Debug, Error)]
pub enum NetError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid proxy entry '{0}': expected host:port or host:port:user:pass")]
    InvalidProxy(String),
}

/// A proxy endpoint with optional basic-auth credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyCredential {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyCredential {
    /// Proxy endpoint URL. Credentials are never embedded.
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// reqwest proxy for every scheme, with basic auth when configured
    pub fn to_proxy(&self) -> Result<Proxy, NetError> {
        let proxy = Proxy::all(self.endpoint()).map_err(|e| NetError::ClientBuild(e.to_string()))?;
        Ok(match (&self.username, &self.password) {
            (Some(user), Some(pass)) => proxy.basic_auth(user, pass),
            _ => proxy,
        })
    }
}

impl FromStr for ProxyCredential {
    type Err = NetError;

    fn from_str(entry: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = entry.trim().split(':').collect();
        let invalid = || NetError::InvalidProxy(entry.to_string());

        let (host, port, username, password) = match parts.as_slice() {
            [host, port] => (*host, *port, None, None),
            [host, port, user, pass] => (*host, *port, Some(user.to_string()), Some(pass.to_string())),
            _ => return Err(invalid()),
        };

        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;

        Ok(Self {
            host: host.to_string(),
            port,
            username,
            password,
        })
    }
}

// Never print the password.
impl fmt::Display for ProxyCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Proxy pool configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Candidate proxies; empty means direct connections
    pub credentials: Vec<ProxyCredential>,
    /// IP-echo endpoint used for validation
    pub check_url: String,
    /// Validation request timeout
    pub timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            credentials: Vec::new(),
            check_url: "http://httpbin.org/ip".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl ProxyConfig {
    /// Parse `host:port[:user:pass]` entries
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Result<Self, NetError> {
        let credentials = entries
            .iter()
            .map(|e| e.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            credentials,
            ..Default::default()
        })
    }
}

/// User agents for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:137.0) Gecko/20100101 Firefox/137.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.7; rv:137.0) Gecko/20100101 Firefox/137.0",
];

/// `Accept` header sent with page requests
pub const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Get a random user agent
pub fn random_user_agent() -> &'static str {
    use rand::Rng;
    let idx = rand::thread_rng().gen_range(0..USER_AGENTS.len());
    USER_AGENTS[idx]
}

/// Create the shared HTTP client for a run.
///
/// The client carries no default user agent; callers set headers per
/// request so the shared client is never mutated.
pub fn create_client(proxy: Option<&ProxyCredential>, timeout: Duration) -> Result<Client, NetError> {
    let mut builder = Client::builder()
        .timeout(timeout)
        .redirect(redirect::Policy::limited(10))
        .danger_accept_invalid_certs(true); // Many small sites and proxies have self-signed certs

    builder = match proxy {
        Some(credential) => builder.proxy(credential.to_proxy()?),
        // Also ignore HTTP_PROXY from the environment
        None => builder.no_proxy(),
    };

    builder
        .build()
        .map_err(|e| NetError::ClientBuild(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct IpEcho {
    origin: String,
}

/// Check whether a proxy can reach the IP-echo service
pub async fn check_proxy(
    credential: &ProxyCredential,
    check_url: &str,
    timeout: Duration,
) -> Result<bool, NetError> {
    let client = create_client(Some(credential), timeout)?;

    let response = client
        .get(check_url)
        .header(reqwest::header::USER_AGENT, random_user_agent())
        .send()
        .await?;

    if response.status() != StatusCode::OK {
        debug!("Proxy {} check returned status {}", credential, response.status());
        return Ok(false);
    }

    match response.json::<IpEcho>().await {
        Ok(echo) => info!("Proxy {} exit address: {}", credential, echo.origin),
        Err(e) => debug!("Proxy {} echo body not understood: {}", credential, e),
    }

    Ok(true)
}

/// Selects and validates the run's proxy
#[derive(Debug)]
pub struct ProxyManager {
    config: ProxyConfig,
    current: OnceLock<Option<ProxyCredential>>,
}

impl ProxyManager {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            config,
            current: OnceLock::new(),
        }
    }

    /// Pick a credential uniformly at random
    pub fn pick(&self) -> Option<&ProxyCredential> {
        use rand::seq::SliceRandom;
        self.config.credentials.choose(&mut rand::thread_rng())
    }

    /// Select and validate the run's proxy.
    ///
    /// Only the first call does any work; later calls return the cached
    /// outcome. `None` means direct connections.
    pub async fn acquire(&self) -> Option<ProxyCredential> {
        if let Some(current) = self.current.get() {
            return current.clone();
        }

        let selected = match self.pick() {
            Some(credential) => credential.clone(),
            None => {
                info!("No proxies configured, using direct connections");
                return self.current.get_or_init(|| None).clone();
            }
        };

        info!("Using proxy {}", selected);

        let validated = match check_proxy(&selected, &self.config.check_url, self.config.timeout).await {
            Ok(true) => {
                info!("Proxy {} validated", selected);
                Some(selected)
            }
            Ok(false) => {
                warn!("Proxy {} is not responding, using direct connections", selected);
                None
            }
            Err(e) => {
                warn!("Proxy {} check failed: {} (using direct connections)", selected, e);
                None
            }
        };

        self.current.get_or_init(|| validated).clone()
    }

    /// The validated proxy, once [`acquire`](Self::acquire) has run
    pub fn current(&self) -> Option<&ProxyCredential> {
        self.current.get().and_then(|c| c.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_auth() {
        let cred: ProxyCredential = "191.102.154.117:9571:user:secret".parse().unwrap();
        assert_eq!(cred.host, "191.102.154.117");
        assert_eq!(cred.port, 9571);
        assert_eq!(cred.username.as_deref(), Some("user"));
        assert_eq!(cred.password.as_deref(), Some("secret"));
        assert_eq!(cred.endpoint(), "http://191.102.154.117:9571");
        assert_eq!(cred.to_string(), "191.102.154.117:9571");
    }

    #[test]
    fn test_parse_without_auth() {
        let cred: ProxyCredential = "proxy.local:8080".parse().unwrap();
        assert_eq!(cred.username, None);
        assert_eq!(cred.endpoint(), "http://proxy.local:8080");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("host".parse::<ProxyCredential>().is_err());
        assert!("host:port".parse::<ProxyCredential>().is_err());
        assert!("host:80:user".parse::<ProxyCredential>().is_err());
        assert!(":80".parse::<ProxyCredential>().is_err());
    }

    #[test]
    fn test_client_with_reserved_chars_in_password() {
        for entry in ["127.0.0.1:8080:user:p#ss", "127.0.0.1:8080:user:p/ss", "127.0.0.1:8080:us@r:p?s s"] {
            let cred: ProxyCredential = entry.parse().unwrap();
            assert!(create_client(Some(&cred), Duration::from_secs(5)).is_ok(), "{}", entry);
        }
    }

    #[test]
    fn test_default_config() {
        let config = ProxyConfig::default();
        assert!(config.credentials.is_empty());
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_random_user_agent() {
        let ua = random_user_agent();
        assert!(ua.contains("Mozilla"));
    }

    #[tokio::test]
    async fn test_acquire_without_pool() {
        let manager = ProxyManager::new(ProxyConfig::default());
        assert_eq!(manager.acquire().await, None);
        assert_eq!(manager.current(), None);
    }
}
