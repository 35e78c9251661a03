// src/errors.rs
//! Failure taxonomy shared by every stage of the monitor.
//!
//! Per-filing failures (`FetchFailed`, `NormalizationFailure`) are contained to
//! the filing, `FeedUnavailable` to the cycle. `PersistenceFailure` is the only
//! class that escalates: it aborts the cycle and, when sustained, the process.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("feed unavailable: {0}")]
    FeedUnavailable(String),
    #[error("fetch failed for {url}: {reason}")]
    FetchFailed { url: String, reason: String },
    #[error("document could not be normalized: {0}")]
    NormalizationFailure(String),
    #[error("persistence failure ({what}): {source}")]
    PersistenceFailure {
        what: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("alert dispatch failed: {0}")]
    AlertDispatchFailure(String),
    #[error("configuration error: {0}")]
    Config(String),
}

pub type MonitorResult<T> = Result<T, MonitorError>;

impl MonitorError {
    pub fn fetch_failed(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::FetchFailed {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn persistence(what: &'static str, source: io::Error) -> Self {
        Self::PersistenceFailure { what, source }
    }

    /// True for the one class that must reach an operator.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::PersistenceFailure { .. })
    }

    /// Short stable label used as a log field and metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FeedUnavailable(_) => "feed_unavailable",
            Self::FetchFailed { .. } => "fetch_failed",
            Self::NormalizationFailure(_) => "normalization_failure",
            Self::PersistenceFailure { .. } => "persistence_failure",
            Self::AlertDispatchFailure(_) => "alert_dispatch_failure",
            Self::Config(_) => "config",
        }
    }
}
