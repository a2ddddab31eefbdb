//! Metric sinks.
//!
//! A scrape cycle emits [`MetricSample`]s into a [`MetricSink`]. The
//! [`PrometheusSink`] buffers them and renders the text exposition format
//! through a registry built for that one render.

use std::collections::HashSet;

use prometheus::core::Collector;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder,
};
use tracing::warn;

use crate::catalog::MetricKind;
use crate::sample::MetricSample;

/// Receives the samples of one scrape cycle.
pub trait MetricSink {
    fn emit(&mut self, sample: MetricSample);
}

impl MetricSink for Vec<MetricSample> {
    fn emit(&mut self, sample: MetricSample) {
        self.push(sample);
    }
}

/// Buffers samples for Prometheus exposition.
#[derive(Debug, Default)]
pub struct PrometheusSink {
    samples: Vec<MetricSample>,
}

impl MetricSink for PrometheusSink {
    fn emit(&mut self, sample: MetricSample) {
        self.samples.push(sample);
    }
}

impl PrometheusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Register every buffered sample in a fresh registry.
    ///
    /// Samples sharing a name form one family; they must agree on label keys.
    pub fn registry(&self) -> Result<Registry, prometheus::Error> {
        let registry = Registry::new();
        for family in group_by_name(&self.samples) {
            registry.register(build_family(&family)?)?;
        }
        Ok(registry)
    }

    /// Render the buffered samples in the text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let registry = self.registry()?;
        let mut buf = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Group samples by metric name, keeping first-seen order.
fn group_by_name(samples: &[MetricSample]) -> Vec<Vec<&MetricSample>> {
    let mut families: Vec<Vec<&MetricSample>> = Vec::new();
    for sample in samples {
        match families.iter_mut().find(|f| f[0].name() == sample.name()) {
            Some(family) => family.push(sample),
            None => families.push(vec![sample]),
        }
    }
    families
}

fn build_family(family: &[&MetricSample]) -> Result<Box<dyn Collector>, prometheus::Error> {
    let first = family[0];
    let opts = Opts::new(first.name(), first.help());
    let keys = first.label_keys();

    for sample in family {
        if sample.label_keys() != keys {
            return Err(prometheus::Error::Msg(format!(
                "metric {} has inconsistent label keys: {:?} vs {:?}",
                first.name(),
                keys,
                sample.label_keys()
            )));
        }
    }

    let duplicates = duplicate_label_sets(family);
    if duplicates > 0 {
        warn!(
            metric = first.name(),
            duplicates, "repeated label set, the last value wins"
        );
    }

    match (first.kind(), keys.is_empty()) {
        (MetricKind::Gauge, true) => {
            let gauge = Gauge::with_opts(opts)?;
            for sample in family {
                gauge.set(sample.value);
            }
            Ok(Box::new(gauge))
        }
        (MetricKind::Gauge, false) => {
            let vec = GaugeVec::new(opts, &keys)?;
            for sample in family {
                vec.get_metric_with_label_values(&sample.label_values())?
                    .set(sample.value);
            }
            Ok(Box::new(vec))
        }
        (MetricKind::Counter, true) => {
            let counter = Counter::with_opts(opts)?;
            for sample in family {
                set_counter(&counter, sample);
            }
            Ok(Box::new(counter))
        }
        (MetricKind::Counter, false) => {
            let vec = CounterVec::new(opts, &keys)?;
            for sample in family {
                let counter = vec.get_metric_with_label_values(&sample.label_values())?;
                set_counter(&counter, sample);
            }
            Ok(Box::new(vec))
        }
    }
}

/// Number of samples repeating a label set already seen in `family`.
fn duplicate_label_sets(family: &[&MetricSample]) -> usize {
    let mut seen = HashSet::new();
    family
        .iter()
        .filter(|sample| !seen.insert(sample.label_values()))
        .count()
}

/// Counters only move up, so the observed value replaces the current one.
fn set_counter(counter: &Counter, sample: &MetricSample) {
    if sample.value < 0.0 || sample.value.is_nan() {
        warn!(metric = sample.name(), value = sample.value, "dropping invalid counter value");
        return;
    }
    counter.reset();
    counter.inc_by(sample.value);
}
