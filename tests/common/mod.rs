// tests/common/mod.rs
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::Router;

use filing_monitor::analyze::{Analyzer, TermIndex};
use filing_monitor::errors::{MonitorError, MonitorResult};
use filing_monitor::ingest::types::{DocumentSource, FeedSource, FilingRecord};
use filing_monitor::ledger::{DedupLedger, LedgerStore};
use filing_monitor::notify::{AlertMessage, Notifier};
use filing_monitor::sink::{CsvResultLog, ResultSink};
use filing_monitor::Pipeline;

pub fn filing(n: u32) -> FilingRecord {
    let cik = format!("{:010}", 1000 + n);
    let acc = format!("{cik}-25-{n:06}");
    FilingRecord {
        identifier: acc,
        entity_name: format!("TEST CO {n}"),
        entity_id: cik,
        filing_type: "8-K".into(),
        filing_date: "2025-10-30".into(),
        document_url: format!("https://docs.test/{n}.htm"),
    }
}

/// `filler` neutral words between a trigger and a context phrase.
pub fn doc_with_gap(trigger: &str, filler: usize, context: &str) -> Vec<u8> {
    let mut s = String::from("<html><body><p>Risk factors. The company detected a ");
    s.push_str(trigger);
    s.push(' ');
    for _ in 0..filler {
        s.push_str("word ");
    }
    s.push_str(context);
    s.push_str(" and continues to assess.</p></body></html>");
    s.into_bytes()
}

pub fn cyber_analyzer() -> Analyzer {
    Analyzer::new(TermIndex::from_lists(
        &["cyber incident", "cyber attack", "unauthorized access"],
        &["nation-state", "foreign government", "state-sponsored"],
        100,
    ))
}

pub fn trade_analyzer() -> Analyzer {
    Analyzer::new(TermIndex::from_lists(
        &["export controls", "entity list"],
        &["china", "prc"],
        100,
    ))
}

/// Feed that replays queued poll results, then `steady` forever.
pub struct FakeFeed {
    queue: Mutex<VecDeque<MonitorResult<Vec<FilingRecord>>>>,
    steady: Vec<FilingRecord>,
    pub polls: Arc<AtomicUsize>,
}

impl FakeFeed {
    pub fn steady(records: Vec<FilingRecord>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            steady: records,
            polls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn then(self, res: MonitorResult<Vec<FilingRecord>>) -> Self {
        self.queue.lock().unwrap().push_back(res);
        self
    }
}

#[async_trait]
impl FeedSource for FakeFeed {
    async fn poll(&self) -> MonitorResult<Vec<FilingRecord>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        match self.queue.lock().unwrap().pop_front() {
            Some(res) => res,
            None => Ok(self.steady.clone()),
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Serves canned bodies by URL; unknown URLs fail with `FetchFailed`.
#[derive(Default)]
pub struct FakeFetcher {
    docs: HashMap<String, Vec<u8>>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl FakeFetcher {
    pub fn with_doc(mut self, url: &str, body: Vec<u8>) -> Self {
        self.docs.insert(url.to_string(), body);
        self
    }
}

#[async_trait]
impl DocumentSource for FakeFetcher {
    async fn fetch(&self, url: &str) -> MonitorResult<Vec<u8>> {
        self.calls.lock().unwrap().push(url.to_string());
        self.docs
            .get(url)
            .cloned()
            .ok_or_else(|| MonitorError::fetch_failed(url, "HTTP 404 Not Found"))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Arc<Mutex<Vec<AlertMessage>>>,
    pub fail: bool,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, msg: &AlertMessage) -> Result<()> {
        self.sent.lock().unwrap().push(msg.clone());
        if self.fail {
            return Err(anyhow!("smtp: connection refused"));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Ledger store whose appends always fail (full disk, read-only volume).
pub struct BrokenStore;

impl LedgerStore for BrokenStore {
    fn load(&mut self) -> io::Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn append(&mut self, _id: &str) -> io::Result<()> {
        Err(io::Error::other("read-only file system"))
    }
}

pub fn pipeline(
    feed: FakeFeed,
    fetcher: FakeFetcher,
    ledger: DedupLedger,
    analyzer: Analyzer,
    results: &Path,
) -> Pipeline {
    let sink = ResultSink::new(CsvResultLog::new(results), "Test");
    Pipeline::new(Box::new(feed), Box::new(fetcher), ledger, analyzer, sink)
}

pub fn csv_rows(path: &Path) -> Vec<csv::StringRecord> {
    if !path.exists() {
        return Vec::new();
    }
    let mut rdr = csv::Reader::from_path(path).unwrap();
    rdr.records().map(|r| r.unwrap()).collect()
}

/// Serve `router` on an ephemeral localhost port.
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}
