//! Search engine registry
//!
//! Known web search engines with their URL templates, request shaping and
//! result page layout.

use serde::{Deserialize, Serialize};

/// Upper bound on results requested from a single engine page
pub const MAX_RESULTS_PER_PAGE: usize = 50;

/// How result links are laid out on an engine's result page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultLayout {
    /// `<a href="/url?q=TARGET&...">`, with a raw URL scan when none match
    RedirectAnchors,
    /// Absolute `http(s)` anchors pointing off-site
    ExternalAnchors,
    /// Raw URL pattern scan of the whole body (script-heavy pages)
    RawUrls,
    /// Text content of `a.result__url` elements
    ResultUrlText,
}

/// A web search engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEngine {
    /// Human-readable name
    pub name: String,
    /// URL template with `{query}` and optional `{count}` placeholders
    pub url_template: String,
    /// Relative weight biasing how early the engine is tried
    pub weight: u32,
    pub layout: ResultLayout,
    /// Substring marking the engine's own links, skipped during parsing
    pub exclude: String,
    /// `Accept-Language` header sent with the query
    pub accept_language: String,
    /// Optional `Referer` header
    pub referer: Option<String>,
}

impl SearchEngine {
    /// Build search URL for a query
    pub fn build_url(&self, query: &str, max_results: usize) -> String {
        let count = max_results.min(MAX_RESULTS_PER_PAGE);
        self.url_template
            .replace("{query}", &urlencoding::encode(query))
            .replace("{count}", &count.to_string())
    }
}

/// Default engines, weighted 3:2:2:1
pub fn default_search_engines() -> Vec<SearchEngine> {
    vec![
        SearchEngine {
            name: "Google".to_string(),
            url_template: "https://www.google.com/search?q={query}&num={count}".to_string(),
            weight: 3,
            layout: ResultLayout::RedirectAnchors,
            exclude: "google".to_string(),
            accept_language: "en-US,en;q=0.5".to_string(),
            referer: None,
        },
        SearchEngine {
            name: "Bing".to_string(),
            url_template: "https://www.bing.com/search?q={query}&count={count}".to_string(),
            weight: 2,
            layout: ResultLayout::ExternalAnchors,
            exclude: "bing.com".to_string(),
            accept_language: "en-US,en;q=0.5".to_string(),
            referer: None,
        },
        SearchEngine {
            name: "Yandex".to_string(),
            url_template: "https://yandex.ru/search/?text={query}&numdoc={count}".to_string(),
            weight: 2,
            layout: ResultLayout::RawUrls,
            exclude: "yandex".to_string(),
            accept_language: "ru-RU,ru;q=0.9,en;q=0.8".to_string(),
            referer: Some("https://yandex.ru/".to_string()),
        },
        SearchEngine {
            name: "DuckDuckGo".to_string(),
            url_template: "https://html.duckduckgo.com/html/?q={query}".to_string(),
            weight: 1,
            layout: ResultLayout::ResultUrlText,
            exclude: "duckduckgo".to_string(),
            accept_language: "en-US,en;q=0.5".to_string(),
            referer: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url() {
        let engines = default_search_engines();
        let url = engines[0].build_url("buy flat", 200);
        assert_eq!(url, "https://www.google.com/search?q=buy%20flat&num=50");

        let url = engines[1].build_url("buy flat", 10);
        assert!(url.ends_with("count=10"));
    }

    #[test]
    fn test_build_url_encodes_query() {
        let engines = default_search_engines();
        let url = engines[3].build_url("кв&б", 10);
        assert_eq!(url, "https://html.duckduckgo.com/html/?q=%D0%BA%D0%B2%26%D0%B1");
    }

    #[test]
    fn test_default_weights() {
        let weights: Vec<u32> = default_search_engines().iter().map(|e| e.weight).collect();
        assert_eq!(weights, vec![3, 2, 2, 1]);
    }
}
