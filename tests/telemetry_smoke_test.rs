//! Smoke tests for OTLP export.
//!
//! These need a local collector on :4317 that forwards traces to Tempo
//! (:3200) and metrics to Prometheus (:9090).
//!
//! Run with:
//! ```sh
//! cargo test --test telemetry_smoke_test -- --ignored --nocapture
//! ```

use std::sync::OnceLock;
use std::time::Duration;

use opentelemetry::KeyValue;
use pricewatcher::scheduler::SweepReport;
use pricewatcher::telemetry::{self, TelemetryConfig, TelemetryGuard, metrics, sweep};

static TELEMETRY: OnceLock<TelemetryGuard> = OnceLock::new();

fn ensure_telemetry() -> &'static TelemetryGuard {
    TELEMETRY.get_or_init(|| {
        telemetry::init_telemetry(TelemetryConfig {
            endpoint: Some("http://localhost:4317".to_string()),
            service_name: "pricewatcher-smoke-test".to_string(),
            default_level: "info".to_string(),
        })
        .expect("failed to init telemetry")
    })
}

async fn flush_and_wait(guard: &TelemetryGuard) {
    guard.force_flush();
    tokio::time::sleep(Duration::from_secs(8)).await;
}

async fn query(url: &str, params: &[(&str, &str)]) -> serde_json::Value {
    let resp = reqwest::Client::new()
        .get(url)
        .query(params)
        .send()
        .await
        .unwrap_or_else(|e| panic!("failed to query {url}: {e}"));
    assert!(resp.status().is_success(), "{url}: {}", resp.status());
    resp.json().await.expect("response is not json")
}

#[test]
#[ignore]
fn smoke_sweep_trace() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let guard = ensure_telemetry();
        {
            let span = sweep::start_sweep_span(6.0);
            let _enter = span.enter();
            sweep::record_sweep_outcome(
                &span,
                &SweepReport {
                    examined: 3,
                    submitted: 2,
                    fresh: 1,
                    ..SweepReport::default()
                },
            );
        }
        flush_and_wait(guard).await;

        let body = query(
            "http://localhost:3200/api/search",
            &[("tags", "service.name=pricewatcher-smoke-test"), ("limit", "5")],
        )
        .await;
        let traces = body["traces"].as_array();
        assert!(
            traces.is_some_and(|t| !t.is_empty()),
            "expected traces in Tempo, got: {body}"
        );
    });
}

#[test]
#[ignore]
fn smoke_queue_metrics() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let guard = ensure_telemetry();

        metrics::queue_operations().add(
            2,
            &[
                KeyValue::new("queue", "queue_bol_com"),
                KeyValue::new("operation", "submit"),
            ],
        );
        metrics::sweep_duration_ms().record(42.5, &[]);
        flush_and_wait(guard).await;

        let body = query(
            "http://localhost:9090/api/v1/query",
            &[("query", "pricewatcher_queue_operations_total")],
        )
        .await;
        let results = body["data"]["result"].as_array();
        assert!(
            results.is_some_and(|r| !r.is_empty()),
            "expected metric results in Prometheus, got: {body}"
        );
    });
}
