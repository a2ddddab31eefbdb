//! Metric catalog: which metrics each Kamailio RPC method can produce.
//!
//! The catalog is built once at startup and shared read-only by every scrape.
//! Each method entry carries its ordered metric definitions and the
//! [`Projector`] that turns the method's decoded response into values.

use std::fmt;
use std::sync::Arc;

use crate::error::{CollectorError, CollectorResult};
use crate::project::{
    CodeBucketProjector, CompositeProjector, DispatcherProjector, FlatProjector, PEER_METRIC,
    PeerProjector, Projector,
};

/// Prefix of every exported metric name.
pub const NAMESPACE: &str = "kamailio";

/// Prometheus value type of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of one metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDefinition {
    name: String,
    local_name: String,
    kind: MetricKind,
    help: String,
    method: String,
}

impl MetricDefinition {
    /// Define a metric produced by `method` from its field `local_name`.
    pub fn new(method: &str, local_name: &str, kind: MetricKind, help: &str) -> Self {
        Self {
            name: exported_name(method, local_name, kind),
            local_name: local_name.to_string(),
            kind,
            help: help.to_string(),
            method: method.to_string(),
        }
    }

    /// Define an exporter-level metric, named `kamailio_<name>` verbatim.
    pub fn exporter(name: &str, kind: MetricKind, help: &str) -> Self {
        Self {
            name: format!("{NAMESPACE}_{name}"),
            local_name: name.to_string(),
            kind,
            help: help.to_string(),
            method: String::new(),
        }
    }

    /// Exported (namespaced) metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field name within the method's response.
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    /// Owning RPC method; empty for exporter-level metrics.
    pub fn method(&self) -> &str {
        &self.method
    }
}

/// `kamailio_<method>_<field>` with dots turned into underscores; counters
/// get a `_total` suffix.
///
/// ```
/// use kamailio_collector::catalog::{exported_name, MetricKind};
///
/// assert_eq!(exported_name("tm.stats", "current", MetricKind::Gauge), "kamailio_tm_stats_current");
/// assert_eq!(exported_name("tm.stats", "created", MetricKind::Counter), "kamailio_tm_stats_created_total");
/// ```
pub fn exported_name(method: &str, local_name: &str, kind: MetricKind) -> String {
    let method = method.replace('.', "_");
    match kind {
        MetricKind::Gauge => format!("{NAMESPACE}_{method}_{local_name}"),
        MetricKind::Counter => format!("{NAMESPACE}_{method}_{local_name}_total"),
    }
}

/// One supported method: its projector and the metrics it declares.
pub struct MethodEntry {
    method: String,
    definitions: Vec<Arc<MetricDefinition>>,
    projector: Box<dyn Projector>,
}

impl fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodEntry")
            .field("method", &self.method)
            .field("metrics", &self.definitions.len())
            .field("projector", &self.projector)
            .finish()
    }
}

impl MethodEntry {
    pub fn new(method: &str, projector: impl Projector + 'static) -> Self {
        Self {
            method: method.to_string(),
            definitions: Vec::new(),
            projector: Box::new(projector),
        }
    }

    pub fn gauge(self, local_name: &str, help: &str) -> Self {
        self.metric(local_name, MetricKind::Gauge, help)
    }

    pub fn counter(self, local_name: &str, help: &str) -> Self {
        self.metric(local_name, MetricKind::Counter, help)
    }

    fn metric(mut self, local_name: &str, kind: MetricKind, help: &str) -> Self {
        let definition = MetricDefinition::new(&self.method, local_name, kind, help);
        self.definitions.push(Arc::new(definition));
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn definitions(&self) -> &[Arc<MetricDefinition>] {
        &self.definitions
    }

    pub fn projector(&self) -> &dyn Projector {
        self.projector.as_ref()
    }
}

/// Registry of supported methods, in declaration order.
#[derive(Debug, Default)]
pub struct Catalog {
    entries: Vec<MethodEntry>,
}

impl Catalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a method. A later entry for the same method replaces the earlier one.
    pub fn with_method(mut self, entry: MethodEntry) -> Self {
        self.entries.retain(|e| e.method != entry.method);
        self.entries.push(entry);
        self
    }

    /// The methods this exporter knows how to scrape.
    pub fn builtin() -> Self {
        Self::new()
            .with_method(
                MethodEntry::new("tm.stats", CodeBucketProjector)
                    .gauge("current", "Current transactions.")
                    .gauge("waiting", "Waiting transactions.")
                    .counter("total", "Total transactions.")
                    .counter("total_local", "Total local transactions.")
                    .counter("rpl_received", "Number of reply received.")
                    .counter("rpl_generated", "Number of reply generated.")
                    .counter("rpl_sent", "Number of reply sent.")
                    .counter("created", "Created transactions.")
                    .counter("freed", "Freed transactions.")
                    .counter("delayed_free", "Delayed free transactions.")
                    .counter("codes", "Per-code counters."),
            )
            .with_method(
                MethodEntry::new("sl.stats", CodeBucketProjector)
                    .counter("codes", "Per-code counters."),
            )
            .with_method(
                MethodEntry::new("core.shmmem", FlatProjector::new())
                    .gauge("total", "Total shared memory.")
                    .gauge("free", "Free shared memory.")
                    .gauge("used", "Used shared memory.")
                    .gauge("real_used", "Real used shared memory.")
                    .gauge("max_used", "Max used shared memory.")
                    .gauge("fragments", "Number of fragments in shared memory."),
            )
            .with_method(
                MethodEntry::new("core.uptime", FlatProjector::new())
                    .counter("uptime", "Uptime in seconds."),
            )
            .with_method(
                MethodEntry::new("core.tcp_info", FlatProjector::new())
                    .gauge("readers", "Total TCP readers.")
                    .gauge("max_connections", "Maximum TCP connections.")
                    .gauge("max_tls_connections", "Maximum TLS connections.")
                    .gauge("opened_connections", "Opened TCP connections.")
                    .gauge("opened_tls_connections", "Opened TLS connections.")
                    .gauge("write_queued_bytes", "Write queued bytes."),
            )
            .with_method(
                MethodEntry::new("dispatcher.list", DispatcherProjector)
                    .gauge("target", "Target status."),
            )
            .with_method(
                MethodEntry::new("tls.info", FlatProjector::new())
                    .gauge("opened_connections", "TLS Opened Connections.")
                    .gauge("max_connections", "TLS Max Connections."),
            )
            .with_method(
                MethodEntry::new(
                    "dlg.stats_active",
                    CompositeProjector::new()
                        .with(FlatProjector::reserving(&[PEER_METRIC]))
                        .with(PeerProjector),
                )
                .gauge("starting", "Dialogs starting.")
                .gauge("connecting", "Dialogs connecting.")
                .gauge("answering", "Dialogs answering.")
                .gauge("ongoing", "Dialogs ongoing.")
                .gauge("all", "Dialogs all.")
                .gauge("peer", "Dialog replication peer."),
            )
            .with_method(
                MethodEntry::new("dmq.list_nodes", PeerProjector).gauge("peer", "DMQ peer."),
            )
    }

    /// Metric definitions for `method`, in declaration order.
    pub fn lookup(&self, method: &str) -> CollectorResult<&[Arc<MetricDefinition>]> {
        self.entry(method).map(MethodEntry::definitions)
    }

    pub fn entry(&self, method: &str) -> CollectorResult<&MethodEntry> {
        self.entries
            .iter()
            .find(|e| e.method == method)
            .ok_or_else(|| CollectorError::UnknownMethod(method.to_string()))
    }

    pub fn is_supported(&self, method: &str) -> bool {
        self.entries.iter().any(|e| e.method == method)
    }

    /// Supported method names, in declaration order.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.method.as_str())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn builtin_methods_in_order() {
        let catalog = Catalog::builtin();
        let methods: Vec<_> = catalog.methods().collect();
        assert_eq!(
            methods,
            vec![
                "tm.stats",
                "sl.stats",
                "core.shmmem",
                "core.uptime",
                "core.tcp_info",
                "dispatcher.list",
                "tls.info",
                "dlg.stats_active",
                "dmq.list_nodes",
            ]
        );
    }

    #[test]
    fn names_are_unique_and_namespaced() {
        let catalog = Catalog::builtin();
        for method in catalog.methods() {
            let definitions = catalog.lookup(method).unwrap();
            let prefix = format!("kamailio_{}_", method.replace('.', "_"));
            let mut seen = HashSet::new();
            for d in definitions {
                assert!(seen.insert(d.name()), "duplicate {}", d.name());
                assert!(d.name().starts_with(&prefix), "{} lacks {prefix}", d.name());
                assert!(!d.name().contains('.'));
                let suffix = &d.name()[prefix.len()..];
                match d.kind() {
                    MetricKind::Counter => {
                        assert_eq!(suffix, format!("{}_total", d.local_name()))
                    }
                    MetricKind::Gauge => assert_eq!(suffix, d.local_name()),
                }
                assert_eq!(d.method(), method);
                assert!(!d.help().is_empty());
            }
        }
    }

    #[test]
    fn unknown_method_lookup_fails() {
        let catalog = Catalog::builtin();
        assert!(!catalog.is_supported("core.version"));
        let err = catalog.lookup("core.version").unwrap_err();
        assert!(matches!(err, CollectorError::UnknownMethod(m) if m == "core.version"));
    }

    #[test]
    fn uptime_is_a_counter() {
        let catalog = Catalog::builtin();
        let defs = catalog.lookup("core.uptime").unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name(), "kamailio_core_uptime_uptime_total");
        assert_eq!(defs[0].kind(), MetricKind::Counter);
    }

    #[test]
    fn exporter_metrics_skip_method_and_suffix() {
        let d = MetricDefinition::exporter("exporter_total_scrapes", MetricKind::Counter, "x");
        assert_eq!(d.name(), "kamailio_exporter_total_scrapes");
        assert_eq!(d.method(), "");
    }

    #[test]
    fn later_entry_replaces_earlier() {
        let catalog = Catalog::new()
            .with_method(MethodEntry::new("x.stats", FlatProjector::new()).gauge("a", "A."))
            .with_method(MethodEntry::new("x.stats", FlatProjector::new()).gauge("b", "B."));
        let defs = catalog.lookup("x.stats").unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].local_name(), "b");
    }
}
