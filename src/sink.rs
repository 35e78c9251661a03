// src/sink.rs
//! Result sink: durable CSV log of matches plus best-effort alert dispatch.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use metrics::counter;
use serde::Serialize;

use crate::analyze::Analysis;
use crate::errors::{MonitorError, MonitorResult};
use crate::ingest::types::FilingRecord;
use crate::notify::{AlertMessage, Notifier};

pub static CSV_HEADER: [&str; 10] = [
    "timestamp",
    "company_name",
    "cik",
    "filing_type",
    "filing_date",
    "filing_url",
    "page_number",
    "trigger_terms_found",
    "context_terms_found",
    "excerpt",
];

/// Column set for monitors that label matches by ticker.
pub static CSV_HEADER_WITH_TICKER: [&str; 11] = [
    "timestamp",
    "company_name",
    "ticker",
    "cik",
    "filing_type",
    "filing_date",
    "filing_url",
    "page_number",
    "trigger_terms_found",
    "context_terms_found",
    "excerpt",
];

/// Ticker shown for a CIK missing from the ticker map.
pub const UNKNOWN_TICKER: &str = "UNKNOWN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchRecord {
    pub timestamp: DateTime<Utc>,
    pub filing: FilingRecord,
    pub trigger_terms_found: Vec<String>,
    pub context_terms_found: Vec<String>,
    pub excerpt: String,
    pub estimated_page: Option<u32>,
    /// Set only by monitors with a ticker map.
    pub ticker: Option<String>,
}

impl MatchRecord {
    pub fn from_analysis(filing: FilingRecord, analysis: &Analysis, now: DateTime<Utc>) -> Self {
        Self {
            timestamp: now,
            filing,
            trigger_terms_found: analysis.trigger_terms.clone(),
            context_terms_found: analysis.context_terms.clone(),
            excerpt: analysis.excerpt.clone(),
            estimated_page: analysis.estimated_page,
            ticker: None,
        }
    }

    pub fn with_ticker(mut self, ticker: impl Into<String>) -> Self {
        self.ticker = Some(ticker.into());
        self
    }

    fn csv_row(&self, ticker_column: bool) -> Vec<String> {
        let f = &self.filing;
        let mut row = vec![
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            f.entity_name.clone(),
            f.entity_id.clone(),
            f.filing_type.clone(),
            f.filing_date.clone(),
            f.document_url.clone(),
            self.estimated_page
                .map(|p| p.to_string())
                .unwrap_or_else(|| "N/A".into()),
            self.trigger_terms_found.join(", "),
            self.context_terms_found.join(", "),
            self.excerpt.clone(),
        ];
        if ticker_column {
            let ticker = self.ticker.as_deref().unwrap_or(UNKNOWN_TICKER);
            row.insert(2, ticker.to_string());
        }
        row
    }
}

/// Append-only CSV file. Each row is one `write_all` + `sync_all`; the header
/// is written when the file is new or empty.
#[derive(Debug)]
pub struct CsvResultLog {
    path: PathBuf,
    lock: Mutex<()>,
    ticker_column: bool,
}

impl CsvResultLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            ticker_column: false,
        }
    }

    /// Use [`CSV_HEADER_WITH_TICKER`].
    pub fn with_ticker_column(mut self) -> Self {
        self.ticker_column = true;
        self
    }

    pub fn header(&self) -> &'static [&'static str] {
        if self.ticker_column {
            &CSV_HEADER_WITH_TICKER[..]
        } else {
            &CSV_HEADER[..]
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, rec: &MatchRecord) -> MonitorResult<()> {
        let fail = |e: io::Error| MonitorError::persistence("results", e);
        let _guard = self
            .lock
            .lock()
            .map_err(|_| fail(io::Error::other("result log lock poisoned")))?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(fail)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(fail)?;
        let needs_header = file.metadata().map_err(fail)?.len() == 0;

        let header = needs_header.then(|| self.header());
        let buf = encode_rows(header, &rec.csv_row(self.ticker_column)).map_err(fail)?;
        file.write_all(&buf).map_err(fail)?;
        file.sync_all().map_err(fail)?;
        Ok(())
    }
}

fn encode_rows(header: Option<&[&str]>, row: &[String]) -> io::Result<Vec<u8>> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    if let Some(h) = header {
        wtr.write_record(h).map_err(io::Error::from)?;
    }
    wtr.write_record(row).map_err(io::Error::from)?;
    wtr.into_inner().map_err(|e| io::Error::other(e.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    Disabled,
    Sent,
    Failed,
}

pub struct ResultSink {
    log: CsvResultLog,
    notifier: Option<Arc<dyn Notifier>>,
    label: String,
    tickers: Option<BTreeMap<String, String>>,
}

impl ResultSink {
    pub fn new(log: CsvResultLog, label: impl Into<String>) -> Self {
        Self {
            log,
            notifier: None,
            label: label.into(),
            tickers: None,
        }
    }

    /// Label matches by ticker (CIK → ticker). An empty map changes nothing.
    pub fn with_tickers(mut self, tickers: BTreeMap<String, String>) -> Self {
        if !tickers.is_empty() {
            self.log = self.log.with_ticker_column();
            self.tickers = Some(tickers);
        }
        self
    }

    /// Build the record for `filing`, with its ticker when this sink labels
    /// matches by ticker.
    pub fn match_record(
        &self,
        filing: FilingRecord,
        analysis: &Analysis,
        now: DateTime<Utc>,
    ) -> MatchRecord {
        let ticker = self.tickers.as_ref().map(|t| {
            t.get(&filing.entity_id)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_TICKER.to_string())
        });
        let rec = MatchRecord::from_analysis(filing, analysis, now);
        match ticker {
            Some(t) => rec.with_ticker(t),
            None => rec,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn alerts_enabled(&self) -> bool {
        self.notifier.is_some()
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    pub fn record(&self, rec: &MatchRecord) -> MonitorResult<()> {
        self.log.append(rec)?;
        tracing::info!(
            target: "sink",
            company = %rec.filing.entity_name,
            ticker = rec.ticker.as_deref().unwrap_or("-"),
            form = %rec.filing.filing_type,
            triggers = %rec.trigger_terms_found.join(", "),
            contexts = %rec.context_terms_found.join(", "),
            "match recorded"
        );
        Ok(())
    }

    /// One dispatch attempt. Failures are logged and counted, never returned.
    pub async fn alert(&self, rec: &MatchRecord) -> AlertOutcome {
        let Some(notifier) = &self.notifier else {
            return AlertOutcome::Disabled;
        };
        let msg = AlertMessage::for_match(&self.label, rec);
        match notifier.send(&msg).await {
            Ok(()) => AlertOutcome::Sent,
            Err(e) => {
                let err = MonitorError::AlertDispatchFailure(format!("{e:#}"));
                counter!("monitor_alert_errors_total").increment(1);
                tracing::warn!(target: "notify", notifier = notifier.name(), error = %err, subject = %msg.subject, "alert failed");
                AlertOutcome::Failed
            }
        }
    }
}
