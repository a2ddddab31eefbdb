//! Router tests against a fake Kamailio control socket.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use kamailio_binrpc::{Record, read_packet, write_packet};
use kamailio_collector::project::ProjectedValue;
use kamailio_collector::{
    Catalog, Collector, CollectorConfig, CollectorResult, DecodedField, MethodEntry, Projection,
    Projector,
};
use kamailio_exporter::{METRICS_CONTENT_TYPE, build_router};
use tokio::net::TcpListener;
use tower::ServiceExt;

async fn fake_kamailio() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                while let Ok((header, request)) = read_packet(&mut socket).await {
                    let reply = match request.first() {
                        Some(Record::Str(m)) if m == "core.uptime" => {
                            vec![Record::from_items([("uptime", Record::Int(12345))])]
                        }
                        _ => vec![Record::Int(500), Record::str("command not found")],
                    };
                    if write_packet(&mut socket, header.cookie, &reply).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    format!("tcp://{addr}")
}

fn collector(uri: String, methods: &[&str]) -> Arc<Collector<kamailio_collector::BinRpcConnector>> {
    collector_with(uri, methods, Catalog::builtin())
}

fn collector_with(
    uri: String,
    methods: &[&str],
    catalog: Catalog,
) -> Arc<Collector<kamailio_collector::BinRpcConnector>> {
    let config = CollectorConfig {
        uri,
        timeout: Duration::from_secs(2),
        methods: methods.iter().map(|m| m.to_string()).collect(),
    };
    Arc::new(Collector::from_config(&config, Arc::new(catalog)).unwrap())
}

/// Emits `uptime` both bare and labelled, which no registry accepts.
#[derive(Debug)]
struct MixedLabelsProjector;

impl Projector for MixedLabelsProjector {
    fn project(&self, _method: &str, _root: &DecodedField) -> CollectorResult<Projection> {
        let mut projection = Projection::default();
        projection.push("uptime", ProjectedValue::scalar(1.0));
        projection.push("uptime", ProjectedValue::labelled(2.0, [("node", "a")]));
        Ok(projection)
    }
}

async fn get(router: axum::Router, uri: &str) -> (StatusCode, Option<String>, String) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = router.oneshot(req).await.unwrap();
    let status = resp.status();
    let content_type = resp
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_string());
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn metrics_endpoint_scrapes_kamailio() {
    let router = build_router(collector(fake_kamailio().await, &["core.uptime"]), "/metrics");

    let (status, content_type, body) = get(router, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some(METRICS_CONTENT_TYPE));
    assert!(body.contains("kamailio_core_uptime_uptime_total 12345"));
    assert!(body.contains("kamailio_up 1"));
    assert!(body.contains("kamailio_exporter_total_scrapes 1"));
}

#[tokio::test]
async fn failed_scrape_still_answers_ok() {
    let router = build_router(
        collector(fake_kamailio().await, &["core.uptime", "dispatcher.list"]),
        "/metrics",
    );

    let (status, _, body) = get(router, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body.contains("kamailio_core_uptime_uptime_total"));
    assert!(body.contains("kamailio_up 0"));
    assert!(body.contains("kamailio_exporter_failed_scrapes 1"));
}

#[tokio::test]
async fn counters_accumulate_across_requests() {
    let router = build_router(collector(fake_kamailio().await, &["core.uptime"]), "/metrics");

    get(router.clone(), "/metrics").await;
    let (_, _, body) = get(router, "/metrics").await;
    assert!(body.contains("kamailio_exporter_total_scrapes 2"));
    assert!(body.contains("kamailio_exporter_failed_scrapes 0"));
}

#[tokio::test]
async fn custom_metrics_path() {
    let router = build_router(collector(fake_kamailio().await, &["core.uptime"]), "/kamailio");

    let (status, _, _) = get(router.clone(), "/kamailio").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = get(router, "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn landing_page_links_metrics() {
    let router = build_router(collector(fake_kamailio().await, &["core.uptime"]), "/kamailio");

    let (status, content_type, body) = get(router, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/html"));
    assert!(body.contains(r#"<a href="/kamailio">"#));
}

#[tokio::test]
async fn unrenderable_samples_fall_back_to_health() {
    let catalog = Catalog::new().with_method(
        MethodEntry::new("core.uptime", MixedLabelsProjector).counter("uptime", "Uptime."),
    );
    let router = build_router(
        collector_with(fake_kamailio().await, &["core.uptime"], catalog),
        "/metrics",
    );

    let (status, content_type, body) = get(router, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some(METRICS_CONTENT_TYPE));
    assert!(!body.contains("kamailio_core_uptime_uptime"));
    assert!(body.contains("kamailio_up 1"));
    assert!(body.contains("kamailio_exporter_total_scrapes 1"));
}
