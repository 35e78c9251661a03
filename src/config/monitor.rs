// src/config/monitor.rs
//! Per-instance monitor configuration. One TOML file per monitor variant
//! (`config/cyber.toml`, `config/trade.toml`); everything that differs between
//! the variants lives here.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::analyze::{Analyzer, TermIndex};
use crate::errors::{MonitorError, MonitorResult};
use crate::ingest::config::{clean_list, load_watchlist_from, normalize_cik};
use crate::ingest::providers::edgar_atom::{EdgarAtomFeed, DEFAULT_FEED_URL, MAX_PAGE_SIZE};
use crate::ingest::FeedFilter;

pub const DEFAULT_CONFIG_PATH: &str = "config/monitor.toml";
pub const ENV_CONFIG_PATH: &str = "MONITOR_CONFIG_PATH";
pub const ENV_ALERT_RECIPIENTS: &str = "ALERT_RECIPIENTS";

fn default_feed_url() -> String {
    DEFAULT_FEED_URL.to_string()
}
fn default_user_agent() -> String {
    format!("filing-monitor/{} ops@example.com", env!("CARGO_PKG_VERSION"))
}
fn default_interval_secs() -> u64 {
    900
}
fn default_page_size() -> usize {
    MAX_PAGE_SIZE
}
fn default_max_pages() -> usize {
    1
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_min_request_delay_ms() -> u64 {
    150
}
fn default_max_retries() -> u32 {
    crate::ingest::fetcher::DEFAULT_MAX_RETRIES
}
fn default_window() -> usize {
    100
}
fn default_excerpt_chars() -> usize {
    crate::analyze::DEFAULT_EXCERPT_CHARS
}
fn default_tokens_per_page() -> usize {
    crate::analyze::normalize::DEFAULT_TOKENS_PER_PAGE
}
fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/seen.log")
}
fn default_results_path() -> PathBuf {
    PathBuf::from("data/results.csv")
}
fn default_max_persistence_failures() -> u32 {
    3
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Sender address; falls back to `SMTP_USER` when unset.
    #[serde(default)]
    pub from: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub name: String,
    /// Human label used in alert subjects ("BIS/China", "Cyber"). Defaults to `name`.
    #[serde(default)]
    pub label: String,
    /// Feed URL template; `{start}` and `{count}` are substituted per page.
    #[serde(default = "default_feed_url")]
    pub feed_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_min_request_delay_ms")]
    pub min_request_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
    #[serde(default = "default_tokens_per_page")]
    pub tokens_per_page: usize,
    #[serde(default)]
    pub trigger_terms: Vec<String>,
    #[serde(default)]
    pub context_terms: Vec<String>,

    #[serde(default)]
    pub forms: Vec<String>,
    #[serde(default)]
    pub watchlist: Vec<String>,
    #[serde(default)]
    pub watchlist_path: Option<PathBuf>,
    /// CIK → ticker. When non-empty, matches are labeled by ticker: the alert
    /// subject shows it and the result log gains a `ticker` column. Entries
    /// from the watch-list file are merged in.
    #[serde(default)]
    pub tickers: BTreeMap<String, String>,

    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
    #[serde(default = "default_results_path")]
    pub results_path: PathBuf,
    #[serde(default)]
    pub status_addr: Option<String>,
    #[serde(default)]
    pub run_once: bool,
    #[serde(default = "default_max_persistence_failures")]
    pub max_consecutive_persistence_failures: u32,

    #[serde(default)]
    pub alert: AlertConfig,
}

impl MonitorConfig {
    /// `$MONITOR_CONFIG_PATH`, else `config/monitor.toml`.
    pub fn load_default() -> anyhow::Result<Self> {
        let path = env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    /// Read a TOML file. A relative `watchlist_path` resolves against the
    /// config file's directory.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read monitor config at {}: {}", path.display(), e)
        })?;
        let mut cfg: MonitorConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid monitor config {}: {}", path.display(), e))?;

        if let Some(wl) = cfg.watchlist_path.as_mut() {
            if wl.is_relative() && !wl.exists() {
                if let Some(dir) = path.parent() {
                    *wl = dir.join(&*wl);
                }
            }
        }
        cfg.finish()?;
        Ok(cfg)
    }

    /// Parse from a TOML string. `watchlist_path` is used as given.
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let mut cfg: MonitorConfig = toml::from_str(toml_str)?;
        cfg.finish()?;
        Ok(cfg)
    }

    // Merge the watch-list file, apply env overrides, normalize, validate.
    fn finish(&mut self) -> anyhow::Result<()> {
        let mut entities = std::mem::take(&mut self.watchlist);
        let mut tickers = BTreeMap::new();
        for (cik, ticker) in std::mem::take(&mut self.tickers) {
            let key = normalize_cik(&cik)
                .ok_or_else(|| anyhow::anyhow!("`tickers` key `{cik}` is not a CIK"))?;
            tickers.insert(key, ticker.trim().to_ascii_uppercase());
        }
        if let Some(p) = &self.watchlist_path {
            for entry in load_watchlist_from(p)? {
                if let Some(t) = entry.ticker {
                    tickers.entry(entry.cik.clone()).or_insert(t);
                }
                entities.push(entry.cik);
            }
        }
        self.watchlist = clean_list(entities)?;
        tickers.retain(|_, t| !t.is_empty());
        self.tickers = tickers;

        if let Ok(list) = env::var(ENV_ALERT_RECIPIENTS) {
            let recipients: Vec<String> = list
                .split([',', ';'])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            if !recipients.is_empty() {
                self.alert.recipients = recipients;
            }
        }

        self.name = self.name.trim().to_string();
        if self.label.trim().is_empty() {
            self.label = self.name.clone();
        }
        self.forms = self
            .forms
            .iter()
            .map(|f| f.trim().to_ascii_uppercase())
            .filter(|f| !f.is_empty())
            .collect();

        self.validate()?;
        Ok(())
    }

    pub fn validate(&self) -> MonitorResult<()> {
        let bad = |msg: String| Err(MonitorError::Config(msg));
        if self.name.is_empty() {
            return bad("`name` must not be empty".into());
        }
        if self.window == 0 {
            return bad("`window` must be > 0".into());
        }
        if self.interval_secs == 0 {
            return bad("`interval_secs` must be > 0".into());
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return bad(format!("`page_size` must be in 1..={MAX_PAGE_SIZE}"));
        }
        let terms = self.term_index();
        if terms.trigger.is_empty() {
            return bad("`trigger_terms` must contain at least one phrase".into());
        }
        if terms.context.is_empty() {
            return bad("`context_terms` must contain at least one phrase".into());
        }
        if self.user_agent.trim().is_empty() {
            return bad("`user_agent` must not be empty".into());
        }
        if self.alert.enabled && self.alert.recipients.is_empty() {
            return bad("alerting is enabled but `alert.recipients` is empty".into());
        }
        Ok(())
    }

    pub fn feed_page_url(&self, start: usize) -> String {
        EdgarAtomFeed::page_url(&self.feed_url, start, self.page_size)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn min_request_delay(&self) -> Duration {
        Duration::from_millis(self.min_request_delay_ms)
    }

    pub fn term_index(&self) -> TermIndex {
        TermIndex::from_lists(&self.trigger_terms, &self.context_terms, self.window)
    }

    pub fn analyzer(&self) -> Analyzer {
        Analyzer::new(self.term_index())
            .with_excerpt_chars(self.excerpt_chars)
            .with_tokens_per_page(self.tokens_per_page)
    }

    pub fn feed_filter(&self) -> FeedFilter {
        FeedFilter::new(self.forms.clone(), self.watchlist.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const MINIMAL: &str = r#"
        name = "trade"
        trigger_terms = ["export controls", "entity list"]
        context_terms = ["china", "prc"]
    "#;

    #[test]
    #[serial]
    fn defaults_fill_in() {
        env::remove_var(ENV_ALERT_RECIPIENTS);
        let cfg = MonitorConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(cfg.label, "trade");
        assert_eq!(cfg.window, 100);
        assert_eq!(cfg.interval_secs, 900);
        assert_eq!(cfg.page_size, 100);
        assert_eq!(cfg.request_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.min_request_delay(), Duration::from_millis(150));
        assert_eq!(cfg.max_consecutive_persistence_failures, 3);
        assert!(!cfg.alert.enabled);
        assert!(cfg.feed_page_url(100).contains("start=100&count=100"));
    }

    #[test]
    #[serial]
    fn forms_and_watchlist_are_normalized() {
        env::remove_var(ENV_ALERT_RECIPIENTS);
        let s = format!("{MINIMAL}\nforms = [\" 8-k\", \"10-q\"]\nwatchlist = [\"1045810\", \"0001045810\"]\n");
        let cfg = MonitorConfig::from_toml_str(&s).unwrap();
        assert_eq!(cfg.forms, vec!["8-K", "10-Q"]);
        assert_eq!(cfg.watchlist, vec!["0001045810"]);
    }

    #[test]
    #[serial]
    fn invalid_values_are_rejected() {
        env::remove_var(ENV_ALERT_RECIPIENTS);
        let zero_window = format!("{MINIMAL}\nwindow = 0\n");
        assert!(MonitorConfig::from_toml_str(&zero_window).is_err());

        let big_page = format!("{MINIMAL}\npage_size = 101\n");
        assert!(MonitorConfig::from_toml_str(&big_page).is_err());

        let no_context = r#"
            name = "x"
            trigger_terms = ["cyber attack"]
            context_terms = ["  "]
        "#;
        let err = MonitorConfig::from_toml_str(no_context).unwrap_err();
        assert!(err.to_string().contains("context_terms"));

        let alert_without_recipients = format!("{MINIMAL}\n[alert]\nenabled = true\n");
        assert!(MonitorConfig::from_toml_str(&alert_without_recipients).is_err());
    }

    #[test]
    #[serial]
    fn recipients_env_override() {
        env::set_var(ENV_ALERT_RECIPIENTS, "a@example.com; b@example.com");
        let s = format!("{MINIMAL}\n[alert]\nenabled = true\n");
        let cfg = MonitorConfig::from_toml_str(&s);
        env::remove_var(ENV_ALERT_RECIPIENTS);
        let cfg = cfg.unwrap();
        assert_eq!(cfg.alert.recipients, vec!["a@example.com", "b@example.com"]);
    }

    #[test]
    #[serial]
    fn tickers_merge_from_inline_table_and_watchlist_file() {
        env::remove_var(ENV_ALERT_RECIPIENTS);
        let dir = tempfile::tempdir().unwrap();
        let wl = dir.path().join("wl.toml");
        fs::write(
            &wl,
            "[[entities]]\ncik = \"1045810\"\nticker = \"NVDA\"\n\n[[entities]]\ncik = \"50863\"\nticker = \"INTC\"\n",
        )
        .unwrap();
        let s = format!(
            "{MINIMAL}\nwatchlist_path = {:?}\n[tickers]\n\"50863\" = \"intel\"\n",
            wl.display().to_string()
        );
        let cfg = MonitorConfig::from_toml_str(&s).unwrap();
        assert_eq!(cfg.watchlist, vec!["0000050863", "0001045810"]);
        assert_eq!(cfg.tickers.get("0001045810").map(String::as_str), Some("NVDA"));
        // the inline table wins over the file
        assert_eq!(cfg.tickers.get("0000050863").map(String::as_str), Some("INTEL"));
    }
}
