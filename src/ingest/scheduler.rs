// src/ingest/scheduler.rs
//! Fixed-interval driver for the pipeline.
//!
//! `Idle → Running` on tick, `Running → Idle` when the cycle ends, whatever
//! its outcome. Shutdown is observed only between cycles.
use std::sync::{Arc, RwLock};
use std::time::Duration;

use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::config::MonitorConfig;
use crate::errors::{MonitorError, MonitorResult};
use crate::pipeline::{CycleReport, Pipeline};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Running,
}

#[derive(Clone, Debug, Serialize)]
pub struct StatusSnapshot {
    pub state: SchedulerState,
    pub cycles: u64,
    pub last_cycle_ts: Option<i64>,
    pub last_report: Option<CycleReport>,
    pub last_error: Option<String>,
    pub consecutive_persistence_failures: u32,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            state: SchedulerState::Idle,
            cycles: 0,
            last_cycle_ts: None,
            last_report: None,
            last_error: None,
            consecutive_persistence_failures: 0,
        }
    }
}

/// Shared, read-mostly view of the scheduler for the status endpoint.
#[derive(Clone, Debug, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<StatusSnapshot>>,
}

impl StatusBoard {
    pub fn snapshot(&self) -> StatusSnapshot {
        match self.inner.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn update(&self, f: impl FnOnce(&mut StatusSnapshot)) {
        match self.inner.write() {
            Ok(mut g) => f(&mut g),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub interval: Duration,
    pub run_once: bool,
    pub max_consecutive_persistence_failures: u32,
}

impl From<&MonitorConfig> for SchedulerCfg {
    fn from(cfg: &MonitorConfig) -> Self {
        Self {
            interval: cfg.poll_interval(),
            run_once: cfg.run_once,
            max_consecutive_persistence_failures: cfg.max_consecutive_persistence_failures,
        }
    }
}

pub struct Scheduler {
    cfg: SchedulerCfg,
    pipeline: Pipeline,
    board: StatusBoard,
}

impl Scheduler {
    pub fn new(cfg: SchedulerCfg, pipeline: Pipeline) -> Self {
        Self {
            cfg,
            pipeline,
            board: StatusBoard::default(),
        }
    }

    pub fn with_board(mut self, board: StatusBoard) -> Self {
        self.board = board;
        self
    }

    pub fn board(&self) -> StatusBoard {
        self.board.clone()
    }

    pub fn state(&self) -> SchedulerState {
        self.board.snapshot().state
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Run one cycle. The error (if any) is returned for the caller to judge;
    /// the state is back to `Idle` either way.
    pub async fn tick(&mut self) -> MonitorResult<CycleReport> {
        self.board.update(|s| s.state = SchedulerState::Running);
        let res = self.pipeline.run_cycle().await;
        let now = chrono::Utc::now().timestamp();

        counter!("monitor_cycles_total").increment(1);
        gauge!("monitor_last_cycle_ts").set(now as f64);

        self.board.update(|s| {
            s.state = SchedulerState::Idle;
            s.cycles += 1;
            s.last_cycle_ts = Some(now);
            match &res {
                Ok(report) => {
                    s.last_report = Some(report.clone());
                    s.last_error = None;
                    s.consecutive_persistence_failures = 0;
                }
                Err(e) => {
                    s.last_error = Some(e.to_string());
                    if e.is_persistence() {
                        s.consecutive_persistence_failures += 1;
                    } else {
                        s.consecutive_persistence_failures = 0;
                    }
                }
            }
        });
        res
    }

    /// Tick until `shutdown` flips to `true` (or its sender is dropped).
    /// Returns `Err` only when persistence has failed for
    /// `max_consecutive_persistence_failures` cycles in a row.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> MonitorResult<()> {
        if self.cfg.run_once {
            return self.tick().await.map(|_| ());
        }

        let mut ticker = tokio::time::interval(self.cfg.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if let Err(e) = self.tick().await {
                let streak = self.board.snapshot().consecutive_persistence_failures;
                if e.is_persistence() && streak >= self.cfg.max_consecutive_persistence_failures.max(1) {
                    tracing::error!(target: "ingest", error = %e, streak, "persistence keeps failing; stopping");
                    return Err(e);
                }
                if !matches!(e, MonitorError::FeedUnavailable(_)) {
                    tracing::warn!(target: "ingest", error = %e, kind = e.kind(), "cycle failed");
                }
            }
        }

        tracing::info!(target: "ingest", "scheduler stopped");
        Ok(())
    }
}
