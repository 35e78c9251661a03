// src/ingest/mod.rs
pub mod config;
pub mod fetcher;
pub mod providers;
pub mod rate;
pub mod scheduler;
pub mod types;

use crate::ingest::types::FilingRecord;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use std::collections::HashSet;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("monitor_cycles_total", "Completed monitoring cycles.");
        describe_counter!("monitor_feed_errors_total", "Feed fetch/parse failures.");
        describe_counter!(
            "monitor_feed_entries_total",
            "Filing records parsed from the feed."
        );
        describe_counter!(
            "monitor_feed_unparsed_total",
            "Feed entries dropped because the title or link was unusable."
        );
        describe_counter!(
            "monitor_feed_filtered_total",
            "Records dropped by the form allow-list or watch-list."
        );
        describe_counter!(
            "monitor_filings_seen_total",
            "Filings marked seen in the dedup ledger."
        );
        describe_counter!(
            "monitor_filings_skipped_total",
            "Filings skipped because the ledger already held them."
        );
        describe_counter!("monitor_fetch_errors_total", "Document fetch failures.");
        describe_counter!("monitor_fetch_retries_total", "Document fetch retries.");
        describe_counter!(
            "monitor_normalize_errors_total",
            "Documents that produced no usable text."
        );
        describe_counter!("monitor_matches_total", "Filings with a proximity match.");
        describe_counter!("monitor_alert_errors_total", "Failed alert dispatches.");
        describe_counter!(
            "monitor_persistence_errors_total",
            "Ledger or result-log write failures."
        );
        describe_histogram!("monitor_feed_parse_ms", "Feed parse time in milliseconds.");
        describe_histogram!("monitor_cycle_ms", "Cycle duration in milliseconds.");
        describe_gauge!("monitor_last_cycle_ts", "Unix ts when the last cycle ended.");
    });
}

/// Form allow-list plus optional entity watch-list. Empty means "everything".
#[derive(Debug, Clone, Default)]
pub struct FeedFilter {
    pub forms: Vec<String>,
    pub watchlist: Vec<String>,
}

impl FeedFilter {
    pub fn new(forms: Vec<String>, watchlist: Vec<String>) -> Self {
        let forms = forms
            .into_iter()
            .map(|f| f.trim().to_ascii_uppercase())
            .filter(|f| !f.is_empty())
            .collect();
        Self { forms, watchlist }
    }

    pub fn accepts(&self, rec: &FilingRecord) -> bool {
        let form_ok = self.forms.is_empty() || self.forms.iter().any(|f| f == &rec.filing_type);
        let entity_ok = self.watchlist.is_empty() || is_watched(&rec.entity_id, &self.watchlist);
        form_ok && entity_ok
    }
}

pub fn is_watched<S: AsRef<str>>(entity_id: S, watchlist: &[String]) -> bool {
    let s = entity_id.as_ref();
    watchlist.iter().any(|w| w.eq_ignore_ascii_case(s))
}

/// Returns (kept, filtered_count).
pub fn filter_records(
    records: Vec<FilingRecord>,
    filter: &FeedFilter,
) -> (Vec<FilingRecord>, usize) {
    let total = records.len();
    let kept: Vec<FilingRecord> = records.into_iter().filter(|r| filter.accepts(r)).collect();
    let filtered = total - kept.len();
    (kept, filtered)
}

/// Keep the first occurrence of each identifier. The feed repeats a filing
/// once per filer CIK and can repeat an entry across pages.
pub fn collapse_duplicates(records: Vec<FilingRecord>) -> Vec<FilingRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.identifier.clone()))
        .collect()
}
