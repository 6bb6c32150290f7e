//! Remote plain-text domain lists

use reqwest::header::USER_AGENT;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::{random_user_agent, NetError};
use mailsweep_core::parse_domain_list;

/// Public domain lists merged into the candidate pool
pub const DEFAULT_DOMAIN_LISTS: &[&str] = &[
    "https://raw.githubusercontent.com/opendns/public-domain-lists/master/opendns-top-domains.txt",
    "https://raw.githubusercontent.com/opendns/public-domain-lists/master/opendns-random-domains.txt",
];

/// Fetch one domain list and parse it, keeping at most `max` entries
pub async fn fetch_domain_list(
    client: &Client,
    url: &str,
    max: usize,
    timeout: Duration,
) -> Result<Vec<String>, NetError> {
    debug!("Fetching domain list: {}", url);

    let response = client
        .get(url)
        .timeout(timeout)
        .header(USER_AGENT, random_user_agent())
        .send()
        .await?
        .error_for_status()?;

    let text = response.text().await?;
    Ok(parse_domain_list(&text).take(max).collect())
}
