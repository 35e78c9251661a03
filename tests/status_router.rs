// tests/status_router.rs
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusBuilder;
use tower::ServiceExt;

use filing_monitor::ingest::scheduler::StatusBoard;
use filing_monitor::status::Metrics;

#[tokio::test]
async fn healthz_reports_idle_scheduler() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let metrics = Metrics::from_handle(recorder.handle(), 900);
    let app = metrics.router(StatusBoard::default());

    let resp = app
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(v["state"], "idle");
    assert_eq!(v["cycles"], 0);
    assert!(v["last_report"].is_null());
}

#[tokio::test]
async fn metrics_endpoint_renders_recorded_series() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::with_local_recorder(&recorder, || {
        metrics::counter!("monitor_cycles_total").increment(2);
        metrics::counter!("monitor_matches_total").increment(1);
    });

    let app = Metrics::from_handle(handle, 300).router(StatusBoard::default());
    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("monitor_cycles_total 2"), "got: {text}");
    assert!(text.contains("monitor_matches_total 1"), "got: {text}");
}
