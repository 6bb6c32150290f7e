//! Contact email extraction
//!
//! Two permissive patterns are applied to page text:
//! - bare `local-part@domain.tld` addresses (TLD of two or more letters)
//! - `mailto:` link targets
//!
//! No further validation is performed. Matches are exact strings; case and
//! Unicode are left untouched.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b").unwrap()
});

static MAILTO_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"mailto:([A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,})").unwrap()
});

/// Extract the deduplicated set of addresses found in `text`.
///
/// The result is the union of both patterns. Applying this twice to the
/// same input yields the same set.
pub fn extract_emails(text: &str) -> BTreeSet<String> {
    let mut emails: BTreeSet<String> = EMAIL_REGEX
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect();

    for cap in MAILTO_REGEX.captures_iter(text) {
        if let Some(addr) = cap.get(1) {
            emails.insert(addr.as_str().to_string());
        }
    }

    emails
}
