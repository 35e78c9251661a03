// src/ingest/fetcher.rs
//! Document fetcher: HTTP GET of a filing document behind the shared rate
//! gate, with bounded retry of transient failures.
//!
//! EDGAR specifics handled here:
//! - inline-XBRL viewer links (`/ix?doc=/Archives/...`) are rewritten to the
//!   underlying document;
//! - filing index pages (`...-index.htm`) are resolved to their primary
//!   document, falling back to the index body when none is linked.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::{Client, StatusCode, Url};

use crate::errors::{MonitorError, MonitorResult};
use crate::ingest::rate::RateGate;
use crate::ingest::types::DocumentSource;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_CAP: Duration = Duration::from_secs(8);

/// Build the one HTTP client an instance uses (identifying User-Agent +
/// per-request timeout).
pub fn build_client(user_agent: &str, timeout: Duration) -> MonitorResult<Client> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .map_err(|e| MonitorError::Config(format!("http client: {e}")))
}

/// `https://www.sec.gov/ix?doc=/Archives/x.htm` → `https://www.sec.gov/Archives/x.htm`
pub fn resolve_document_url(url: &str) -> String {
    match url.split_once("/ix?doc=") {
        Some((origin, doc)) if doc.starts_with('/') => format!("{origin}{doc}"),
        _ => url.to_string(),
    }
}

pub fn is_index_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    path.ends_with("-index.htm") || path.ends_with("-index.html")
}

/// First document linked from an EDGAR index page that lives in the same
/// filing directory and is not itself an index.
pub fn primary_document_from_index(index_html: &str, index_url: &str) -> Option<String> {
    static RE_HREF: OnceCell<Regex> = OnceCell::new();
    let re = RE_HREF.get_or_init(|| {
        Regex::new(r#"(?i)<a\s[^>]*href\s*=\s*["']([^"']+)["']"#).expect("href regex")
    });

    let base = Url::parse(index_url).ok()?;
    let dir = match index_url.rfind('/') {
        Some(i) => &index_url[..=i],
        None => return None,
    };

    re.captures_iter(index_html)
        .filter_map(|c| c.get(1))
        .filter_map(|m| base.join(m.as_str()).ok())
        .map(|u| resolve_document_url(u.as_str()))
        .find(|u| {
            let lower = u.to_ascii_lowercase();
            u.starts_with(dir)
                && !lower.contains("-index")
                && (lower.ends_with(".htm") || lower.ends_with(".html") || lower.ends_with(".txt"))
        })
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 403 | 429 | 500 | 502 | 503 | 504)
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32 << attempt.min(16);
    base.saturating_mul(factor).min(BACKOFF_CAP)
}

pub struct HttpDocumentFetcher {
    client: Client,
    gate: Arc<RateGate>,
    max_retries: u32,
    backoff_base: Duration,
}

impl HttpDocumentFetcher {
    pub fn new(client: Client, gate: Arc<RateGate>) -> Self {
        Self {
            client,
            gate,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: BACKOFF_BASE,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// One GET with retries. Every attempt passes through the rate gate.
    pub async fn get_bytes(&self, url: &str) -> MonitorResult<Vec<u8>> {
        let mut attempt: u32 = 0;
        loop {
            self.gate.wait().await;
            let reason = match self.client.get(url).send().await {
                Ok(rsp) => {
                    let status = rsp.status();
                    if status.is_success() {
                        return rsp
                            .bytes()
                            .await
                            .map(|b| b.to_vec())
                            .map_err(|e| MonitorError::fetch_failed(url, e));
                    }
                    if !is_retryable(status) {
                        return Err(MonitorError::fetch_failed(url, format!("HTTP {status}")));
                    }
                    format!("HTTP {status}")
                }
                Err(e) => e.to_string(),
            };

            if attempt >= self.max_retries {
                return Err(MonitorError::fetch_failed(
                    url,
                    format!("{reason} after {} attempt(s)", attempt + 1),
                ));
            }
            let delay = backoff_delay(self.backoff_base, attempt);
            tracing::debug!(target: "ingest", %url, %reason, ?delay, "retrying fetch");
            counter!("monitor_fetch_retries_total").increment(1);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentFetcher {
    async fn fetch(&self, url: &str) -> MonitorResult<Vec<u8>> {
        let url = resolve_document_url(url);
        let body = self.get_bytes(&url).await?;
        if !is_index_url(&url) {
            return Ok(body);
        }
        let html = String::from_utf8_lossy(&body);
        match primary_document_from_index(&html, &url) {
            Some(primary) => {
                tracing::debug!(target: "ingest", index = %url, %primary, "resolved primary document");
                self.get_bytes(&primary).await
            }
            None => Ok(body),
        }
    }
}
