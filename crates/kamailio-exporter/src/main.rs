//! kamailio-exporter: Prometheus exporter for Kamailio.
//!
//! Scrapes the Kamailio control socket over BINRPC each time the metrics
//! path is requested.
//!
//! # Usage
//!
//! ```text
//! kamailio-exporter --uri unix:/var/run/kamailio/kamailio_ctl --listen 0.0.0.0:9494
//! kamailio-exporter --uri tcp://127.0.0.1:2049 --methods tm.stats,dispatcher.list
//! kamailio-exporter --config /etc/kamailio-exporter.toml
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use kamailio_collector::{Catalog, Collector};
use kamailio_exporter::{ExporterConfig, Overrides, build_router};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,kamailio_exporter=debug,kamailio_collector=debug";

#[derive(Parser, Debug)]
#[command(
    name = "kamailio-exporter",
    version,
    about = "Prometheus exporter for Kamailio"
)]
struct Cli {
    /// Address to serve metrics on [default: 0.0.0.0:9494].
    #[arg(long, env = "KAMAILIO_EXPORTER_LISTEN")]
    listen: Option<SocketAddr>,

    /// Path under which metrics are exposed [default: /metrics].
    #[arg(long, env = "KAMAILIO_EXPORTER_METRICS_PATH")]
    metrics_path: Option<String>,

    /// Kamailio control socket: unix:/path or tcp://host:port
    /// [default: unix:/var/run/kamailio/kamailio_ctl].
    #[arg(long, env = "KAMAILIO_EXPORTER_URI")]
    uri: Option<String>,

    /// Timeout for one scrape cycle, e.g. 500ms, 5s, 1m [default: 5s].
    #[arg(long, env = "KAMAILIO_EXPORTER_TIMEOUT")]
    timeout: Option<String>,

    /// Comma-separated RPC methods to scrape
    /// [default: tm.stats,sl.stats,core.shmmem,core.uptime].
    #[arg(long, env = "KAMAILIO_EXPORTER_METHODS")]
    methods: Option<String>,

    /// TOML config file. Flags override its values.
    #[arg(long, env = "KAMAILIO_EXPORTER_CONFIG")]
    config: Option<PathBuf>,

    /// Log as JSON lines.
    #[arg(long, env = "KAMAILIO_EXPORTER_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            listen: self.listen,
            metrics_path: self.metrics_path.clone(),
            uri: self.uri.clone(),
            timeout: self.timeout.clone(),
            methods: self.methods.clone(),
            log_json: self.log_json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ExporterConfig::load(cli.config.as_deref(), cli.overrides())?;

    init_tracing(config.log_json);

    // Reject bad configuration before binding anything.
    let catalog = Arc::new(Catalog::builtin());
    let collector = Collector::from_config(&config.collector, catalog)
        .context("invalid collector configuration")?;
    collector.log_startup();

    let router = build_router(Arc::new(collector), &config.metrics_path);

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    info!(addr = %config.listen, path = %config.metrics_path, "kamailio exporter listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("kamailio exporter stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    }
}
