//! filing-monitor binary entrypoint.
//! Loads one monitor config, wires the pipeline and runs the scheduler until
//! Ctrl-C (or a single cycle when `run_once` is set).
//!
//! Config path: first CLI argument, else `$MONITOR_CONFIG_PATH`, else
//! `config/monitor.toml`.

use std::path::PathBuf;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use filing_monitor::config::MonitorConfig;
use filing_monitor::status::{self, Metrics};
use filing_monitor::{Pipeline, Scheduler, SchedulerCfg};

/// Compact logs by default, JSON lines with `LOG_FORMAT=json`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("filing_monitor=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; SMTP_* and MONITOR_CONFIG_PATH may live there.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = match std::env::args().nth(1) {
        Some(p) => MonitorConfig::load_from(&PathBuf::from(p))?,
        None => MonitorConfig::load_default()?,
    };
    tracing::info!(
        monitor = %cfg.name,
        interval_secs = cfg.interval_secs,
        window = cfg.window,
        forms = ?cfg.forms,
        watchlist = cfg.watchlist.len(),
        run_once = cfg.run_once,
        "monitor starting"
    );

    let pipeline = Pipeline::from_config(&cfg)?;
    let mut scheduler = Scheduler::new(SchedulerCfg::from(&cfg), pipeline);

    if let Some(addr) = cfg.status_addr.as_deref() {
        let addr = addr
            .parse()
            .with_context(|| format!("invalid status_addr `{addr}`"))?;
        let metrics = Metrics::init(cfg.interval_secs)?;
        let router = metrics.router(scheduler.board());
        tokio::spawn(async move {
            if let Err(e) = status::serve(addr, router).await {
                tracing::error!(error = %format!("{e:#}"), "status endpoint stopped");
            }
        });
    }

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested; finishing current cycle");
            let _ = tx.send(true);
        }
    });

    scheduler.run(rx).await?;
    Ok(())
}
