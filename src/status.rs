// src/status.rs
//! Optional HTTP status surface: `/metrics` (Prometheus) and `/healthz`.
use std::net::SocketAddr;

use anyhow::Context;
use axum::{extract::State, routing::get, Json, Router};
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::ingest::ensure_metrics_described;
use crate::ingest::scheduler::{StatusBoard, StatusSnapshot};

#[derive(Clone)]
struct StatusState {
    handle: PrometheusHandle,
    board: StatusBoard,
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Call once per process.
    pub fn init(interval_secs: u64) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        Ok(Self::from_handle(handle, interval_secs))
    }

    /// Wrap an existing handle (tests build a recorder without installing it).
    pub fn from_handle(handle: PrometheusHandle, interval_secs: u64) -> Self {
        ensure_metrics_described();
        gauge!("monitor_poll_interval_secs").set(interval_secs as f64);
        Self { handle }
    }

    /// Router exposing `/metrics` (exposition format) and `/healthz` (JSON
    /// snapshot of the scheduler).
    pub fn router(&self, board: StatusBoard) -> Router {
        let state = StatusState {
            handle: self.handle.clone(),
            board,
        };
        Router::new()
            .route("/metrics", get(render_metrics))
            .route("/healthz", get(healthz))
            .with_state(state)
    }
}

async fn render_metrics(State(st): State<StatusState>) -> String {
    st.handle.render()
}

async fn healthz(State(st): State<StatusState>) -> Json<StatusSnapshot> {
    Json(st.board.snapshot())
}

/// Bind and serve until the process exits. Runs in its own task.
pub async fn serve(addr: SocketAddr, router: Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding status endpoint on {addr}"))?;
    tracing::info!(target: "status", %addr, "status endpoint listening");
    axum::serve(listener, router).await.context("status server")?;
    Ok(())
}
