//! Metric samples handed to a sink.

use std::sync::Arc;

use crate::catalog::{MetricDefinition, MetricKind};
use crate::project::Labels;

/// One value of one metric, with its labels.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub definition: Arc<MetricDefinition>,
    pub value: f64,
    pub labels: Labels,
}

impl MetricSample {
    pub fn new(definition: Arc<MetricDefinition>, value: f64, labels: Labels) -> Self {
        Self {
            definition,
            value,
            labels,
        }
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn kind(&self) -> MetricKind {
        self.definition.kind()
    }

    pub fn help(&self) -> &str {
        self.definition.help()
    }

    /// Label keys, sorted.
    pub fn label_keys(&self) -> Vec<&str> {
        self.labels.keys().map(String::as_str).collect()
    }

    /// Label values, in key order.
    pub fn label_values(&self) -> Vec<&str> {
        self.labels.values().map(String::as_str).collect()
    }

    /// Value of label `key`, if set.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}
