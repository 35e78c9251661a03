// src/ingest/providers/edgar_atom.rs
//! EDGAR "current filings" Atom feed provider.
//!
//! Entry titles look like `8-K - NVIDIA CORP (0001045810) (Filer)`; the
//! accession number comes from `<id>` (`...accession-number=0001045810-25-000230`),
//! falling back to the link and the summary. EDGAR lists a co-registrant or
//! multi-role filing once per CIK under the same accession number, so the
//! accession alone identifies the filing.
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::errors::{MonitorError, MonitorResult};
use crate::ingest::config::normalize_cik;
use crate::ingest::rate::RateGate;
use crate::ingest::types::{FeedSource, FilingRecord};
use crate::ingest::{collapse_duplicates, filter_records, FeedFilter};

pub const DEFAULT_FEED_URL: &str = "https://www.sec.gov/cgi-bin/browse-edgar?action=getcurrent&CIK=&type=&company=&dateb=&owner=include&start={start}&count={count}&output=atom";
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    title: Option<TextNode>,
    link: Option<LinkNode>,
    summary: Option<TextNode>,
    updated: Option<String>,
    id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct LinkNode {
    #[serde(rename = "@href", default)]
    href: String,
}

fn re_title() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r"^([\w\-/]+)\s+-\s+(.+?)\s+\((\d+)\)").expect("title regex")
    })
}

fn re_accession() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(\d{10}-\d{2}-\d{6})").expect("accession regex"))
}

fn re_filed() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?i)filed:\D{0,16}(\d{4}-\d{2}-\d{2})").expect("filed regex"))
}

/// RFC 3339 timestamp → `YYYY-MM-DD`; unparseable input is returned trimmed.
fn filing_date_from_updated(ts: &str) -> String {
    OffsetDateTime::parse(ts.trim(), &Rfc3339)
        .map(|dt| dt.date().to_string())
        .unwrap_or_else(|_| ts.trim().to_string())
}

fn record_from_entry(e: Entry) -> Option<FilingRecord> {
    let title = e.title.map(|t| t.value).unwrap_or_default();
    let caps = re_title().captures(title.trim())?;
    let filing_type = caps[1].to_ascii_uppercase();
    let entity_name = caps[2].trim().to_string();
    let entity_id = normalize_cik(&caps[3])?;

    let document_url = e.link.map(|l| l.href.trim().to_string()).unwrap_or_default();
    if document_url.is_empty() {
        return None;
    }
    let summary = e.summary.map(|s| s.value).unwrap_or_default();

    let accession = [e.id.as_deref().unwrap_or_default(), &document_url, &summary]
        .into_iter()
        .find_map(|s| re_accession().captures(s).map(|c| c[1].to_string()));
    let identifier = accession.unwrap_or_else(|| document_url.clone());

    let filing_date = re_filed()
        .captures(&summary)
        .map(|c| c[1].to_string())
        .or_else(|| e.updated.as_deref().map(filing_date_from_updated))
        .unwrap_or_default();

    Some(FilingRecord {
        identifier,
        entity_name,
        entity_id,
        filing_type,
        filing_date,
        document_url,
    })
}

/// Parse one feed page. Returns the records plus the raw entry count (used to
/// decide whether another page exists).
pub fn parse_feed(xml: &str) -> Result<(Vec<FilingRecord>, usize)> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let feed: Feed = from_str(&xml_clean).context("parsing edgar atom xml")?;

    let raw = feed.entries.len();
    let out: Vec<FilingRecord> = feed.entries.into_iter().filter_map(record_from_entry).collect();
    if out.len() < raw {
        counter!("monitor_feed_unparsed_total").increment((raw - out.len()) as u64);
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("monitor_feed_parse_ms").record(ms);
    counter!("monitor_feed_entries_total").increment(out.len() as u64);
    Ok((out, raw))
}

pub struct EdgarAtomFeed {
    mode: Mode,
    filter: FeedFilter,
}

enum Mode {
    // Pre-fetched pages (tests, replay).
    Fixture(Vec<String>),
    Http {
        url_template: String,
        client: reqwest::Client,
        gate: Arc<RateGate>,
        page_size: usize,
        max_pages: usize,
    },
}

impl EdgarAtomFeed {
    pub fn from_fixture(xml: &str) -> Self {
        Self::from_fixture_pages(vec![xml.to_string()])
    }

    pub fn from_fixture_pages(pages: Vec<String>) -> Self {
        Self {
            mode: Mode::Fixture(pages),
            filter: FeedFilter::default(),
        }
    }

    pub fn from_url(
        url_template: impl Into<String>,
        client: reqwest::Client,
        gate: Arc<RateGate>,
    ) -> Self {
        Self {
            mode: Mode::Http {
                url_template: url_template.into(),
                client,
                gate,
                page_size: MAX_PAGE_SIZE,
                max_pages: 1,
            },
            filter: FeedFilter::default(),
        }
    }

    pub fn with_filter(mut self, filter: FeedFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Only meaningful for HTTP mode. `page_size` is clamped to 1..=100.
    pub fn with_paging(mut self, size: usize, pages: usize) -> Self {
        if let Mode::Http {
            page_size,
            max_pages,
            ..
        } = &mut self.mode
        {
            *page_size = size.clamp(1, MAX_PAGE_SIZE);
            *max_pages = pages.max(1);
        }
        self
    }

    pub fn page_url(template: &str, start: usize, count: usize) -> String {
        template
            .replace("{start}", &start.to_string())
            .replace("{count}", &count.to_string())
    }

    async fn fetch_page(
        client: &reqwest::Client,
        gate: &RateGate,
        url: &str,
    ) -> Result<String> {
        gate.wait().await;
        let rsp = client
            .get(url)
            .send()
            .await
            .context("edgar feed get()")?
            .error_for_status()
            .context("edgar feed non-2xx")?;
        rsp.text().await.context("edgar feed .text()")
    }

    async fn collect(&self) -> MonitorResult<Vec<FilingRecord>> {
        let unavailable = |e: anyhow::Error| {
            counter!("monitor_feed_errors_total").increment(1);
            MonitorError::FeedUnavailable(format!("{e:#}"))
        };

        match &self.mode {
            Mode::Fixture(pages) => {
                let mut out = Vec::new();
                for p in pages {
                    out.extend(parse_feed(p).map_err(unavailable)?.0);
                }
                Ok(out)
            }
            Mode::Http {
                url_template,
                client,
                gate,
                page_size,
                max_pages,
            } => {
                let mut out = Vec::new();
                for page in 0..*max_pages {
                    let url = Self::page_url(url_template, page * page_size, *page_size);
                    let parsed = match Self::fetch_page(client, gate, &url).await {
                        Ok(body) => parse_feed(&body),
                        Err(e) => Err(e),
                    };
                    match parsed {
                        Ok((records, raw)) => {
                            out.extend(records);
                            if raw < *page_size {
                                break;
                            }
                        }
                        Err(e) if page == 0 => return Err(unavailable(e)),
                        Err(e) => {
                            tracing::warn!(target: "ingest", error = %format!("{e:#}"), page, "feed paging stopped");
                            break;
                        }
                    }
                }
                Ok(out)
            }
        }
    }
}

#[async_trait]
impl FeedSource for EdgarAtomFeed {
    async fn poll(&self) -> MonitorResult<Vec<FilingRecord>> {
        // Filter before collapsing so a watched co-registrant is the entry kept.
        let (kept, filtered) = filter_records(self.collect().await?, &self.filter);
        counter!("monitor_feed_filtered_total").increment(filtered as u64);
        let kept = collapse_duplicates(kept);
        tracing::debug!(target: "ingest", kept = kept.len(), filtered, "feed polled");
        Ok(kept)
    }

    fn name(&self) -> &'static str {
        "edgar-atom"
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
