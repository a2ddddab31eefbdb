//! Exporter self-health: `up`, total scrapes and failed scrapes.

use std::sync::{Arc, LazyLock};

use crate::catalog::{MetricDefinition, MetricKind};
use crate::project::Labels;
use crate::sample::MetricSample;

static UP: LazyLock<Arc<MetricDefinition>> = LazyLock::new(|| {
    Arc::new(MetricDefinition::exporter(
        "up",
        MetricKind::Gauge,
        "Whether the last scrape of Kamailio succeeded.",
    ))
});

static TOTAL_SCRAPES: LazyLock<Arc<MetricDefinition>> = LazyLock::new(|| {
    Arc::new(MetricDefinition::exporter(
        "exporter_total_scrapes",
        MetricKind::Counter,
        "Current total Kamailio scrapes.",
    ))
});

static FAILED_SCRAPES: LazyLock<Arc<MetricDefinition>> = LazyLock::new(|| {
    Arc::new(MetricDefinition::exporter(
        "exporter_failed_scrapes",
        MetricKind::Counter,
        "Number of failed Kamailio scrapes.",
    ))
});

/// Health definitions, in emission order.
pub fn health_definitions() -> [Arc<MetricDefinition>; 3] {
    [UP.clone(), TOTAL_SCRAPES.clone(), FAILED_SCRAPES.clone()]
}

/// Cumulative scrape health. Counters only grow for the process lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExporterHealth {
    up: bool,
    total_scrapes: u64,
    failed_scrapes: u64,
}

impl ExporterHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a scrape attempt.
    pub fn begin_scrape(&mut self) {
        self.total_scrapes += 1;
    }

    pub fn record_success(&mut self) {
        self.up = true;
    }

    pub fn record_failure(&mut self) {
        self.up = false;
        self.failed_scrapes += 1;
    }

    pub fn is_up(&self) -> bool {
        self.up
    }

    pub fn total_scrapes(&self) -> u64 {
        self.total_scrapes
    }

    pub fn failed_scrapes(&self) -> u64 {
        self.failed_scrapes
    }

    /// `up`, total and failed scrapes as samples.
    pub fn samples(&self) -> Vec<MetricSample> {
        let [up, total, failed] = health_definitions();
        vec![
            MetricSample::new(up, if self.up { 1.0 } else { 0.0 }, Labels::new()),
            MetricSample::new(total, self.total_scrapes as f64, Labels::new()),
            MetricSample::new(failed, self.failed_scrapes as f64, Labels::new()),
        ]
    }
}
