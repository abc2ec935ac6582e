//! Full-page text fetcher for search hits.
//!
//! Used when the research loop is configured to condense page text instead of
//! the search snippet. Only public http(s) targets are fetched.

use std::net::IpAddr;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use reqwest::redirect::Policy;
use scraper::{Html, Node};
use tracing::{debug, instrument};
use url::Url;

use deepresearch_shared::{FetchConfig, ProviderError, ResearchError, Result};

use crate::{PageFetcher, USER_AGENT, send_error};

/// Elements whose text never counts as page content.
const SKIPPED_ELEMENTS: &[&str] = &[
    "head", "script", "style", "noscript", "nav", "footer", "header", "aside", "svg", "form",
];

/// Redirect hops followed per fetch.
const MAX_REDIRECTS: usize = 5;

/// HTTP fetcher that reduces an HTML page to its visible text.
pub struct HttpPageFetcher {
    client: Client,
    timeout: Duration,
    max_chars: usize,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_private: bool,
}

impl HttpPageFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        Ok(Self {
            client: build_client(timeout, false)?,
            timeout,
            max_chars: config.max_chars,
            allow_private: false,
        })
    }

    /// Allow fetching localhost/private IPs, including as redirect targets.
    pub fn allow_private(mut self) -> Result<Self> {
        self.client = build_client(self.timeout, true)?;
        self.allow_private = true;
        Ok(self)
    }
}

fn build_client(timeout: Duration, allow_private: bool) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(redirect_policy(allow_private))
        .timeout(timeout)
        .build()
        .map_err(|e| ResearchError::config(format!("failed to build HTTP client: {e}")))
}

/// Follow at most [`MAX_REDIRECTS`] hops, re-checking every target.
fn redirect_policy(allow_private: bool) -> Policy {
    Policy::custom(move |attempt| {
        match redirect_refusal(attempt.url(), attempt.previous().len(), allow_private) {
            Some(reason) => attempt.error(reason),
            None => attempt.follow(),
        }
    })
}

/// Why a redirect to `next` after `hops` previous URLs must not be followed.
fn redirect_refusal(next: &Url, hops: usize, allow_private: bool) -> Option<String> {
    if hops > MAX_REDIRECTS {
        return Some(format!("more than {MAX_REDIRECTS} redirects"));
    }
    if !allow_private && is_ssrf_target(next) {
        return Some(format!("redirect to private or non-http target {next}"));
    }
    None
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    #[instrument(skip(self))]
    async fn fetch_text(&self, url: &str) -> std::result::Result<String, ProviderError> {
        let parsed = Url::parse(url).map_err(|e| ProviderError::Blocked(format!("{url}: {e}")))?;
        if !self.allow_private && is_ssrf_target(&parsed) {
            return Err(ProviderError::Blocked(format!("{url}: private or non-http target")));
        }

        let response = self
            .client
            .get(parsed.as_str())
            .send()
            .await
            .map_err(|e| {
                if e.is_redirect() {
                    ProviderError::Blocked(format!("{url}: {e}"))
                } else {
                    ProviderError::Network(format!("{url}: {e}"))
                }
            })?;

        let body = send_error(response)
            .await?
            .text()
            .await
            .map_err(|e| ProviderError::Network(format!("{url}: body read failed: {e}")))?;

        let text = truncate_chars(&extract_text(&body), self.max_chars);
        if text.is_empty() {
            return Err(ProviderError::malformed(format!("{url}: no readable text")));
        }

        debug!(chars = text.len(), "page text extracted");
        Ok(text)
    }
}

/// Visible text of an HTML document, whitespace-collapsed.
pub fn extract_text(html: &str) -> String {
    static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    let doc = Html::parse_document(html);
    let mut parts: Vec<&str> = Vec::new();

    for node in doc.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| match a.value() {
            Node::Element(el) => SKIPPED_ELEMENTS.contains(&el.name()),
            _ => false,
        });
        if !hidden {
            parts.push(text);
        }
    }

    WS_RE.replace_all(&parts.join(" "), " ").trim().to_string()
}

/// Truncate to at most `max_chars` characters on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}
