// src/pipeline.rs
//! One monitoring cycle: poll → skip seen → fetch → normalize → match →
//! record → alert → mark seen.
//!
//! Filings are processed sequentially. A filing is marked seen only after its
//! processing completes, including the failed-fetch and no-text cases; a
//! persistence failure aborts the cycle before the filing is marked.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::Utc;
use metrics::{counter, histogram};
use serde::Serialize;

use crate::analyze::Analyzer;
use crate::config::MonitorConfig;
use crate::errors::MonitorResult;
use crate::ingest::ensure_metrics_described;
use crate::ingest::fetcher::{build_client, HttpDocumentFetcher};
use crate::ingest::providers::edgar_atom::EdgarAtomFeed;
use crate::ingest::rate::RateGate;
use crate::ingest::types::{DocumentSource, FeedSource, FilingRecord};
use crate::ledger::DedupLedger;
use crate::notify::email::EmailSender;
use crate::sink::{AlertOutcome, CsvResultLog, ResultSink};

/// Counters for one cycle; exposed on `/healthz`.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CycleReport {
    pub polled: usize,
    pub skipped_seen: usize,
    pub processed: usize,
    pub matched: usize,
    pub fetch_failures: usize,
    pub normalize_failures: usize,
    pub alerts_sent: usize,
    pub alerts_failed: usize,
    pub duration_ms: u64,
}

pub struct Pipeline {
    feed: Box<dyn FeedSource>,
    fetcher: Box<dyn DocumentSource>,
    ledger: DedupLedger,
    analyzer: Analyzer,
    sink: ResultSink,
}

impl Pipeline {
    pub fn new(
        feed: Box<dyn FeedSource>,
        fetcher: Box<dyn DocumentSource>,
        ledger: DedupLedger,
        analyzer: Analyzer,
        sink: ResultSink,
    ) -> Self {
        Self {
            feed,
            fetcher,
            ledger,
            analyzer,
            sink,
        }
    }

    /// Wire the production collaborators: one HTTP client and one rate gate
    /// shared by the feed poller and the document fetcher.
    pub fn from_config(cfg: &MonitorConfig) -> anyhow::Result<Self> {
        let client = build_client(&cfg.user_agent, cfg.request_timeout())?;
        let gate = Arc::new(RateGate::new(cfg.min_request_delay()));

        let feed = EdgarAtomFeed::from_url(cfg.feed_url.clone(), client.clone(), gate.clone())
            .with_paging(cfg.page_size, cfg.max_pages)
            .with_filter(cfg.feed_filter());
        let fetcher = HttpDocumentFetcher::new(client, gate).with_retries(cfg.max_retries);
        let ledger = DedupLedger::open_file(&cfg.ledger_path)
            .with_context(|| format!("opening ledger {}", cfg.ledger_path.display()))?;

        let mut sink = ResultSink::new(CsvResultLog::new(&cfg.results_path), cfg.label.clone())
            .with_tickers(cfg.tickers.clone());
        if cfg.alert.enabled {
            let email = EmailSender::from_env(&cfg.alert)
                .context("alerting is enabled but email is not configured")?;
            sink = sink.with_notifier(Arc::new(email));
        }

        tracing::info!(
            target: "pipeline",
            monitor = %cfg.name,
            feed = %cfg.feed_page_url(0),
            seen = ledger.len(),
            alerts = sink.alerts_enabled(),
            "pipeline ready"
        );

        Ok(Self::new(
            Box::new(feed),
            Box::new(fetcher),
            ledger,
            cfg.analyzer(),
            sink,
        ))
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    pub fn sink(&self) -> &ResultSink {
        &self.sink
    }

    /// `FeedUnavailable` and `PersistenceFailure` end the cycle early; every
    /// other failure is contained to its filing.
    pub async fn run_cycle(&mut self) -> MonitorResult<CycleReport> {
        ensure_metrics_described();
        let t0 = Instant::now();

        let records = match self.feed.poll().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(target: "pipeline", feed = self.feed.name(), error = %e, "feed poll failed; cycle skipped");
                return Err(e);
            }
        };

        let mut report = CycleReport {
            polled: records.len(),
            ..Default::default()
        };

        for rec in records {
            if self.ledger.has(&rec.identifier) {
                report.skipped_seen += 1;
                counter!("monitor_filings_skipped_total").increment(1);
                continue;
            }
            if let Err(e) = self.process_filing(rec, &mut report).await {
                if e.is_persistence() {
                    counter!("monitor_persistence_errors_total").increment(1);
                    tracing::error!(target: "pipeline", error = %e, "persistence failure; cycle aborted");
                }
                return Err(e);
            }
        }

        report.duration_ms = t0.elapsed().as_millis() as u64;
        histogram!("monitor_cycle_ms").record(report.duration_ms as f64);
        tracing::info!(
            target: "pipeline",
            polled = report.polled,
            skipped = report.skipped_seen,
            processed = report.processed,
            matched = report.matched,
            fetch_failures = report.fetch_failures,
            ms = report.duration_ms,
            "cycle complete"
        );
        Ok(report)
    }

    async fn process_filing(
        &mut self,
        rec: FilingRecord,
        report: &mut CycleReport,
    ) -> MonitorResult<()> {
        match self.fetcher.fetch(&rec.document_url).await {
            Ok(body) => match self.analyzer.analyze_bytes(&body) {
                Ok(Some(analysis)) => {
                    let m = self.sink.match_record(rec.clone(), &analysis, Utc::now());
                    self.sink.record(&m)?;
                    report.matched += 1;
                    counter!("monitor_matches_total").increment(1);
                    match self.sink.alert(&m).await {
                        AlertOutcome::Sent => report.alerts_sent += 1,
                        AlertOutcome::Failed => report.alerts_failed += 1,
                        AlertOutcome::Disabled => {}
                    }
                }
                Ok(None) => {
                    tracing::debug!(target: "pipeline", id = %rec.identifier, "no proximity match");
                }
                Err(e) => {
                    report.normalize_failures += 1;
                    counter!("monitor_normalize_errors_total").increment(1);
                    tracing::warn!(target: "pipeline", id = %rec.identifier, error = %e, "document skipped");
                }
            },
            Err(e) => {
                report.fetch_failures += 1;
                counter!("monitor_fetch_errors_total").increment(1);
                tracing::warn!(target: "pipeline", id = %rec.identifier, error = %e, "fetch failed; filing marked seen");
            }
        }

        self.ledger.mark(&rec.identifier)?;
        report.processed += 1;
        counter!("monitor_filings_seen_total").increment(1);
        Ok(())
    }
}
