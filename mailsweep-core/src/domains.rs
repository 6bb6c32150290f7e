//! Candidate domain handling
//!
//! Normalization of URLs into candidate domains, parsing of plain-text
//! domain lists, and network-free synthetic generation.

use std::collections::HashSet;
use std::ops::Range;

/// Vocabulary used by [`generate_domains`]
pub const DEFAULT_WORDS: &[&str] = &[
    "tech", "digital", "global", "smart", "quick", "easy", "fast", "neo",
    "meta", "hyper", "alpha", "beta", "gamma", "prime", "elite", "pro",
    "max", "ultra", "mega", "super", "net", "web", "cloud", "data",
    "info", "sys", "online", "soft", "hard", "code", "app", "dev",
];

/// TLDs used by [`generate_domains`]
pub const DEFAULT_TLDS: &[&str] = &["com", "net", "org", "info", "biz", "ru", "ua", "by", "kz"];

/// Numeric suffixes appended in the second generation phase
const NUMERIC_SUFFIXES: Range<u32> = 100..500;

/// Number of leading TLDs used with numeric suffixes
const NUMERIC_TLD_COUNT: usize = 2;

/// Reduce a URL (or bare host) to a candidate domain.
///
/// Adds `http://` when no scheme is present, keeps only the host and strips
/// a leading `www.`. Hosts without a dot or of 3 characters or fewer are
/// rejected.
pub fn extract_domain(url: &str) -> Option<String> {
    let url = url.trim();
    let parsed = if url.starts_with("http") {
        url::Url::parse(url)
    } else {
        url::Url::parse(&format!("http://{}", url))
    }
    .ok()?;

    let host = parsed.host_str()?;
    let domain = host.strip_prefix("www.").unwrap_or(host);

    if domain.contains('.') && domain.len() > 3 {
        Some(domain.to_string())
    } else {
        None
    }
}

/// Parse a plain-text domain list, one domain per line.
///
/// Blank lines and `#` comments are skipped. Every other entry goes through
/// [`extract_domain`], so URLs and `www.` hosts reduce to bare domains.
pub fn parse_domain_list(text: &str) -> impl Iterator<Item = String> + '_ {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(extract_domain)
}

/// Build `keyword.tld` guesses from the words of a search query
pub fn keyword_domains(query: &str, tlds: &[&str], max: usize) -> Vec<String> {
    let mut collector = DomainSet::new(max);

    'outer: for keyword in query.to_lowercase().split_whitespace() {
        for tld in tlds {
            if collector.push(format!("{}.{}", keyword, tld)) {
                break 'outer;
            }
        }
    }

    collector.into_vec()
}

/// Generate up to `count` synthetic domains from the default vocabulary
pub fn generate_domains(count: usize) -> Vec<String> {
    generate_domains_from(DEFAULT_WORDS, DEFAULT_TLDS, count)
}

/// Generate up to `count` unique domains.
///
/// Phase one is the product `word1 + word2 . tld`. If that is not enough,
/// phase two emits `word + n . tld` for the numeric suffix range over the
/// first two TLDs. Output order is deterministic.
pub fn generate_domains_from(words: &[&str], tlds: &[&str], count: usize) -> Vec<String> {
    let mut collector = DomainSet::new(count);
    if collector.is_full() {
        return collector.into_vec();
    }

    for first in words {
        for second in words {
            for tld in tlds {
                if collector.push(format!("{}{}.{}", first, second, tld)) {
                    return collector.into_vec();
                }
            }
        }
    }

    for word in words {
        for n in NUMERIC_SUFFIXES {
            for tld in tlds.iter().take(NUMERIC_TLD_COUNT) {
                if collector.push(format!("{}{}.{}", word, n, tld)) {
                    return collector.into_vec();
                }
            }
        }
    }

    collector.into_vec()
}

/// Ordered, deduplicating, capped set of domains
#[derive(Debug, Clone)]
pub struct DomainSet {
    seen: HashSet<String>,
    items: Vec<String>,
    cap: usize,
}

impl DomainSet {
    pub fn new(cap: usize) -> Self {
        Self {
            seen: HashSet::new(),
            items: Vec::new(),
            cap,
        }
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.cap
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Slots left before the cap
    pub fn remaining(&self) -> usize {
        self.cap.saturating_sub(self.items.len())
    }

    /// Add a domain unless already present. Returns true once the cap is reached.
    pub fn push(&mut self, item: String) -> bool {
        if self.is_full() {
            return true;
        }
        if self.seen.insert(item.clone()) {
            self.items.push(item);
        }
        self.is_full()
    }

    /// Add domains in order until the cap is reached. Returns true once full.
    pub fn extend<I: IntoIterator<Item = String>>(&mut self, items: I) -> bool {
        for item in items {
            if self.push(item) {
                return true;
            }
        }
        self.is_full()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<String> {
        self.items
    }
}
