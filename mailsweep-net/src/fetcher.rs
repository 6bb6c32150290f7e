//! Page fetcher and email extractor
//!
//! Fetches one candidate's landing page and extracts contact addresses.
//! Every failure is caught here and turned into a [`ScanResult`], so one bad
//! site never affects the rest of a batch.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1251, WINDOWS_1252};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::{random_user_agent, ACCEPT_HTML};
use mailsweep_core::{extract_emails, FetchFailure, ScanResult};

/// Fetch limits
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Per-request timeout, body included
    pub request_timeout: Duration,
    /// Bodies are truncated to this many bytes
    pub max_body_bytes: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(8),
            max_body_bytes: 500_000,
        }
    }
}

/// A decoded page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Candidate URL that answered 200
    pub url: String,
    pub text: String,
    /// Name of the encoding used to decode the body
    pub encoding: &'static str,
    /// Whether the body hit the size cap
    pub truncated: bool,
}

/// Tried in order when the declared encoding fails
fn fallback_encodings() -> [&'static Encoding; 2] {
    [WINDOWS_1251, WINDOWS_1252]
}

/// Label reported when every encoding failed and a lossy decode was used
pub const LOSSY_UTF8: &str = "UTF-8 (lossy)";

/// Fetches candidates over a shared client
#[derive(Debug, Clone)]
pub struct FetchExtractor {
    client: Client,
    settings: FetchSettings,
}

impl FetchExtractor {
    pub fn new(client: Client, settings: FetchSettings) -> Self {
        Self { client, settings }
    }

    /// Scan one candidate and classify the outcome
    pub async fn scan(&self, domain: &str) -> ScanResult {
        match self.fetch(domain).await {
            Ok(page) => {
                let emails = extract_emails(&page.text);
                ScanResult::fetched(page.url, emails)
            }
            Err(failure) => {
                debug!("Scan of {} failed: {}", domain, failure);
                ScanResult::failed(domain, failure)
            }
        }
    }

    /// Fetch the first candidate URL that answers 200
    pub async fn fetch(&self, domain: &str) -> Result<FetchedPage, FetchFailure> {
        self.fetch_first(domain, candidate_urls(domain)).await
    }

    /// Try `urls` in order. Any failure, body reads included, moves on to
    /// the next URL; the last failure is reported when all fail.
    async fn fetch_first(&self, domain: &str, urls: Vec<String>) -> Result<FetchedPage, FetchFailure> {
        let mut last_failure = FetchFailure::Network(format!("no URL to try for '{}'", domain));

        for url in urls {
            debug!("Connecting to {}", url);

            let response = match self
                .client
                .get(&url)
                .timeout(self.settings.request_timeout)
                .header(USER_AGENT, random_user_agent())
                .header(ACCEPT, ACCEPT_HTML)
                .header(ACCEPT_LANGUAGE, "en-US,en;q=0.8,ru;q=0.7")
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    debug!("Connection to {} failed: {}", url, e);
                    last_failure = FetchFailure::Network(e.to_string());
                    continue;
                }
            };

            if response.status() != StatusCode::OK {
                debug!("Status {} for {}", response.status(), url);
                last_failure = FetchFailure::Status(response.status().as_u16());
                continue;
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let (bytes, truncated) = match read_capped(response, self.settings.max_body_bytes).await {
                Ok(read) => read,
                Err(e) => {
                    debug!("Reading body from {} failed: {}", url, e);
                    last_failure = FetchFailure::Body(e.to_string());
                    continue;
                }
            };
            let (text, encoding) = decode_body(&bytes, content_type.as_deref());

            return Ok(FetchedPage {
                url,
                text,
                encoding,
                truncated,
            });
        }

        Err(last_failure)
    }
}

/// URLs to try for a candidate: as given when a scheme is present,
/// otherwise `https://` then `http://`
pub fn candidate_urls(domain: &str) -> Vec<String> {
    if domain.starts_with("http://") || domain.starts_with("https://") {
        vec![domain.to_string()]
    } else {
        vec![format!("https://{}", domain), format!("http://{}", domain)]
    }
}

/// Stream the body, stopping once `cap` bytes are held
async fn read_capped(mut response: Response, cap: usize) -> Result<(Vec<u8>, bool), reqwest::Error> {
    let mut body = Vec::new();

    while let Some(chunk) = response.chunk().await? {
        let remaining = cap - body.len();
        if chunk.len() > remaining {
            body.extend_from_slice(&chunk[..remaining]);
            return Ok((body, true));
        }
        body.extend_from_slice(&chunk);
    }

    Ok((body, false))
}

/// Decode a body: declared charset (UTF-8 when absent), then the legacy
/// fallbacks, then lossy UTF-8
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> (String, &'static str) {
    let declared = content_type
        .and_then(extract_charset)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);

    let attempts = std::iter::once(declared).chain(fallback_encodings());
    for encoding in attempts {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            return (text.into_owned(), encoding.name());
        }
    }

    (String::from_utf8_lossy(bytes).into_owned(), LOSSY_UTF8)
}

fn extract_charset(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.trim().split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(&['"', '\''][..]).to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_client;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Serves one response whose body is shorter than its Content-Length
    async fn truncated_body_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 1000\r\n\r\nshort")
                .await;
        });
        format!("http://{}/", addr)
    }

    fn extractor() -> FetchExtractor {
        let client = create_client(None, Duration::from_secs(5)).unwrap();
        FetchExtractor::new(client, FetchSettings::default())
    }

    #[tokio::test]
    async fn test_body_failure_moves_to_next_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<p>info@next.example</p>", "text/html"))
            .mount(&server)
            .await;

        let broken = truncated_body_server().await;
        let page = extractor()
            .fetch_first("next.example", vec![broken, format!("{}/", server.uri())])
            .await
            .unwrap();

        assert!(page.url.starts_with(&server.uri()));
        assert!(page.text.contains("info@next.example"));
    }

    #[tokio::test]
    async fn test_body_failure_reported_when_last() {
        let broken = truncated_body_server().await;
        let err = extractor().fetch_first("x.example", vec![broken]).await.unwrap_err();
        assert!(matches!(err, FetchFailure::Body(_)));
    }

    #[test]
    fn test_candidate_urls() {
        assert_eq!(
            candidate_urls("example.com"),
            vec!["https://example.com", "http://example.com"]
        );
        assert_eq!(candidate_urls("http://example.com/a"), vec!["http://example.com/a"]);
    }

    #[test]
    fn test_decode_default_utf8() {
        let (text, encoding) = decode_body("héllo".as_bytes(), None);
        assert_eq!(text, "héllo");
        assert_eq!(encoding, "UTF-8");
    }

    #[test]
    fn test_decode_declared_charset() {
        // "Привет" in windows-1251
        let bytes = [0xCF, 0xF0, 0xE8, 0xE2, 0xE5, 0xF2];
        let (text, encoding) = decode_body(&bytes, Some("text/html; Charset=\"windows-1251\""));
        assert_eq!(text, "Привет");
        assert_eq!(encoding, "windows-1251");
    }

    #[test]
    fn test_decode_falls_back_to_legacy() {
        let bytes = [0xCF, 0xF0, 0xE8, 0xE2, 0xE5, 0xF2];
        let (text, encoding) = decode_body(&bytes, Some("text/html"));
        assert_eq!(text, "Привет");
        assert_eq!(encoding, "windows-1251");
    }

    #[test]
    fn test_extract_charset() {
        assert_eq!(extract_charset("text/html; charset=utf-8"), Some("utf-8".to_string()));
        assert_eq!(extract_charset("text/html"), None);
    }
}
