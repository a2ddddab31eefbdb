//! kamailio-exporter: HTTP surface of the Kamailio exporter.
//!
//! Every request to the metrics path runs one scrape cycle and renders
//! the result in the Prometheus text format.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Landing page |
//! | GET | `<metrics path>` | Prometheus exposition (default `/metrics`) |

pub mod config;

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use kamailio_collector::{Collector, Connector, MetricSink, PrometheusSink};
use tracing::error;

pub use config::{ExporterConfig, FileConfig, Overrides};

pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared state for the handlers.
pub struct ExporterState<C: Connector> {
    pub collector: Arc<Collector<C>>,
    pub metrics_path: Arc<str>,
}

impl<C: Connector> Clone for ExporterState<C> {
    fn clone(&self) -> Self {
        Self {
            collector: Arc::clone(&self.collector),
            metrics_path: Arc::clone(&self.metrics_path),
        }
    }
}

/// Build the exporter router.
pub fn build_router<C>(collector: Arc<Collector<C>>, metrics_path: &str) -> Router
where
    C: Connector + 'static,
{
    let state = ExporterState {
        collector,
        metrics_path: Arc::from(metrics_path),
    };

    Router::new()
        .route("/", get(landing_page::<C>))
        .route(metrics_path, get(metrics::<C>))
        .with_state(state)
}

/// `GET <metrics path>`. Runs one scrape cycle. A failed cycle still answers 200
/// with the health series, and so does a cycle whose samples cannot be
/// rendered.
async fn metrics<C>(State(state): State<ExporterState<C>>) -> Response
where
    C: Connector + 'static,
{
    let mut sink = PrometheusSink::new();
    state.collector.collect(&mut sink).await;

    let rendered = match sink.render() {
        Ok(body) => Ok(body),
        Err(e) => {
            error!(error = %e, "failed to render metrics, serving health only");
            let mut health = PrometheusSink::new();
            for sample in state.collector.health().await.samples() {
                health.emit(sample);
            }
            health.render()
        }
    };

    match rendered {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to render health metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to render metrics: {e}"),
            )
                .into_response()
        }
    }
}

/// GET /
async fn landing_page<C>(State(state): State<ExporterState<C>>) -> Html<String>
where
    C: Connector + 'static,
{
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Kamailio Exporter</title></head>
<body>
<h1>Kamailio Exporter</h1>
<p><a href="{path}">Metrics</a></p>
</body>
</html>
"#,
        path = state.metrics_path
    ))
}
