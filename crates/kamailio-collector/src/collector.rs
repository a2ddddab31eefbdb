//! Scrape orchestration.
//!
//! One cycle: connect, then per configured method call → decode → project,
//! then close. Any failure aborts the cycle and no method samples are
//! emitted. The health series are emitted last either way.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use kamailio_binrpc::Record;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::catalog::Catalog;
use crate::config::{CollectorConfig, validate_methods};
use crate::decode::decode_response;
use crate::error::{CollectorError, CollectorResult};
use crate::health::ExporterHealth;
use crate::sample::MetricSample;
use crate::sink::MetricSink;
use crate::transport::{BinRpcConnector, Connector, RpcConnection};

/// Where in the cycle a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapePhase {
    Connecting,
    Calling,
    Decoding,
    Projecting,
}

impl fmt::Display for ScrapePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScrapePhase::Connecting => "connecting",
            ScrapePhase::Calling => "calling",
            ScrapePhase::Decoding => "decoding",
            ScrapePhase::Projecting => "projecting",
        };
        f.write_str(s)
    }
}

/// The single cause of a failed cycle.
#[derive(Debug, Error)]
#[error("scrape failed while {phase}: {error}")]
pub struct ScrapeFailure {
    pub phase: ScrapePhase,
    /// Method in flight; `None` while connecting.
    pub method: Option<String>,
    #[source]
    pub error: CollectorError,
}

impl ScrapeFailure {
    fn new(phase: ScrapePhase, method: Option<&str>, error: impl Into<CollectorError>) -> Self {
        Self {
            phase,
            method: method.map(str::to_string),
            error: error.into(),
        }
    }
}

/// Result of one cycle.
#[derive(Debug)]
pub enum ScrapeOutcome {
    /// Number of method samples emitted, health excluded.
    Success { samples: usize },
    Failed(ScrapeFailure),
}

impl ScrapeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ScrapeOutcome::Success { .. })
    }

    pub fn failure(&self) -> Option<&ScrapeFailure> {
        match self {
            ScrapeOutcome::Failed(failure) => Some(failure),
            ScrapeOutcome::Success { .. } => None,
        }
    }
}

/// Runs scrape cycles against one Kamailio instance.
pub struct Collector<C: Connector> {
    connector: C,
    catalog: Arc<Catalog>,
    methods: Vec<String>,
    /// Held for a whole cycle, so cycles never overlap.
    health: Mutex<ExporterHealth>,
}

impl<C: Connector + fmt::Debug> fmt::Debug for Collector<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("connector", &self.connector)
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

impl Collector<BinRpcConnector> {
    /// Validate `config` and build a collector that scrapes over BINRPC.
    pub fn from_config(config: &CollectorConfig, catalog: Arc<Catalog>) -> CollectorResult<Self> {
        let endpoint = config.validate(&catalog)?;
        let connector = BinRpcConnector::new(endpoint, config.timeout);
        Self::new(connector, catalog, config.methods.clone())
    }
}

impl<C: Connector> Collector<C> {
    /// Every method must be in `catalog` and listed once.
    pub fn new(connector: C, catalog: Arc<Catalog>, methods: Vec<String>) -> CollectorResult<Self> {
        validate_methods(&methods, &catalog)?;
        Ok(Self {
            connector,
            catalog,
            methods,
            health: Mutex::new(ExporterHealth::new()),
        })
    }

    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Current health counters. Waits for an in-flight cycle to finish.
    pub async fn health(&self) -> ExporterHealth {
        *self.health.lock().await
    }

    /// Run one scrape cycle and emit its samples into `sink`.
    pub async fn collect<S: MetricSink>(&self, sink: &mut S) -> ScrapeOutcome {
        let mut health = self.health.lock().await;
        health.begin_scrape();
        let started = Instant::now();

        let outcome = match self.run_cycle().await {
            Ok(samples) => {
                health.record_success();
                let count = samples.len();
                for sample in samples {
                    sink.emit(sample);
                }
                debug!(
                    target_socket = %self.connector.describe(),
                    samples = count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "scrape complete"
                );
                ScrapeOutcome::Success { samples: count }
            }
            Err(failure) => {
                health.record_failure();
                error!(
                    target_socket = %self.connector.describe(),
                    phase = %failure.phase,
                    method = failure.method.as_deref().unwrap_or("-"),
                    error = %failure.error,
                    "scrape failed"
                );
                ScrapeOutcome::Failed(failure)
            }
        };

        for sample in health.samples() {
            sink.emit(sample);
        }
        outcome
    }

    async fn run_cycle(&self) -> Result<Vec<MetricSample>, ScrapeFailure> {
        let mut conn = self
            .connector
            .connect()
            .await
            .map_err(|e| ScrapeFailure::new(ScrapePhase::Connecting, None, e))?;

        let result = self.call_methods(&mut conn).await;
        conn.close().await;
        result
    }

    async fn call_methods(
        &self,
        conn: &mut C::Connection,
    ) -> Result<Vec<MetricSample>, ScrapeFailure> {
        let mut samples = Vec::new();
        for method in &self.methods {
            let records = conn
                .call(method)
                .await
                .map_err(|e| ScrapeFailure::new(ScrapePhase::Calling, Some(method.as_str()), e))?;
            samples.extend(self.project_records(method, records)?);
        }
        Ok(samples)
    }

    /// Decode and project one method's reply into samples, in catalog order.
    ///
    /// Projected names the catalog does not declare are dropped.
    pub fn project_records(
        &self,
        method: &str,
        records: Vec<Record>,
    ) -> Result<Vec<MetricSample>, ScrapeFailure> {
        let entry = self
            .catalog
            .entry(method)
            .map_err(|e| ScrapeFailure::new(ScrapePhase::Projecting, Some(method), e))?;

        let root = decode_response(method, records)
            .map_err(|e| ScrapeFailure::new(ScrapePhase::Decoding, Some(method), e))?;

        let mut projection = entry
            .projector()
            .project(method, &root)
            .map_err(|e| ScrapeFailure::new(ScrapePhase::Projecting, Some(method), e))?;

        let mut samples = Vec::new();
        for definition in entry.definitions() {
            for value in projection.take(definition.local_name()) {
                samples.push(MetricSample::new(
                    Arc::clone(definition),
                    value.value,
                    value.labels,
                ));
            }
        }

        for name in projection.names() {
            debug!(method, field = name, "dropping field without a metric definition");
        }
        Ok(samples)
    }

    /// Log what this collector will scrape.
    pub fn log_startup(&self) {
        info!(
            target_socket = %self.connector.describe(),
            methods = ?self.methods,
            "collector ready"
        );
    }
}
