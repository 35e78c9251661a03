// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod errors;
pub mod ledger;
pub mod pipeline;
pub mod sink;
pub mod status;

// Term index, normalizer, proximity matcher
pub mod analyze;

// Feed polling, document fetch, rate gate, scheduler
pub mod ingest;

// Alert rendering and delivery
pub mod notify;

// ---- Re-exports for stable public API ----
pub use crate::config::MonitorConfig;
pub use crate::errors::{MonitorError, MonitorResult};
pub use crate::ingest::scheduler::{Scheduler, SchedulerCfg, SchedulerState};
pub use crate::pipeline::{CycleReport, Pipeline};
