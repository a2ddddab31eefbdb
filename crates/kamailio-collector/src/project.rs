//! Metric projection: per-method policy mapping decoded fields to values.
//!
//! Every projector produces a [`Projection`]: local metric name → values,
//! each value carrying its own label set. Projectors are bound to methods
//! in the [`Catalog`](crate::catalog::Catalog).
//!
//! | Projector | Methods | Labels |
//! |---|---|---|
//! | [`CodeBucketProjector`] | `tm.stats`, `sl.stats` | `code` on `codes` |
//! | [`FlatProjector`] | `core.*`, `tls.info` | none |
//! | [`DispatcherProjector`] | `dispatcher.list` | `uri`, `flags`, `setid` |
//! | [`PeerProjector`] | `dlg.stats_active`, `dmq.list_nodes` | `host`, `status`, `local` |

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::decode::DecodedField;
use crate::error::{CollectorError, CollectorResult, DecodeError};

/// Canonical (sorted) label set.
pub type Labels = BTreeMap<String, String>;

/// Local name of the per-code metric.
pub const CODES_METRIC: &str = "codes";
/// Local name of the dispatcher target metric.
pub const TARGET_METRIC: &str = "target";
/// Local name of the peer metric.
pub const PEER_METRIC: &str = "peer";

/// Status-code-like keys: "200", "6xx", "xxx".
static CODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[0-9x]{3}$").expect("code pattern is a valid regex"));

/// Whether `key` is folded into the `codes` metric.
pub fn is_code_bucket(key: &str) -> bool {
    CODE_PATTERN.is_match(key)
}

/// One projected value and its labels.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedValue {
    pub value: f64,
    pub labels: Labels,
}

impl ProjectedValue {
    pub fn scalar(value: f64) -> Self {
        Self {
            value,
            labels: Labels::new(),
        }
    }

    pub fn labelled<K, V>(value: f64, labels: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            value,
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Output of a projector: local metric name → values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    values: BTreeMap<String, Vec<ProjectedValue>>,
}

impl Projection {
    /// Append a value to `name`.
    pub fn push(&mut self, name: &str, value: ProjectedValue) {
        self.values.entry(name.to_string()).or_default().push(value);
    }

    /// Replace whatever `name` held with a single value.
    pub fn set(&mut self, name: &str, value: ProjectedValue) {
        self.values.insert(name.to_string(), vec![value]);
    }

    pub fn get(&self, name: &str) -> &[ProjectedValue] {
        self.values.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Remove and return the values of `name`.
    pub fn take(&mut self, name: &str) -> Vec<ProjectedValue> {
        self.values.remove(name).unwrap_or_default()
    }

    pub fn merge(&mut self, other: Projection) {
        for (name, values) in other.values {
            self.values.entry(name).or_default().extend(values);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Local names that still hold values.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Maps one method's decoded reply to metric values.
pub trait Projector: Send + Sync + fmt::Debug {
    fn project(&self, method: &str, root: &DecodedField) -> CollectorResult<Projection>;
}

fn top_level<'a>(
    method: &str,
    root: &'a DecodedField,
) -> CollectorResult<&'a [(String, DecodedField)]> {
    root.as_group()
        .map_err(|e| CollectorError::malformed(method, e))
}

// ── Flat families ───────────────────────────────────────────────────

/// Top-level integers; status-code keys fold into a labelled `codes` metric.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeBucketProjector;

impl Projector for CodeBucketProjector {
    fn project(&self, method: &str, root: &DecodedField) -> CollectorResult<Projection> {
        let mut projection = Projection::default();
        for (key, field) in top_level(method, root)? {
            if key == CODES_METRIC {
                debug!(method, field = %key, "skipping field shadowing the codes metric");
                continue;
            }
            let value = match field.as_int() {
                Ok(v) => v as f64,
                Err(e) => {
                    debug!(method, field = %key, error = %e, "skipping field");
                    continue;
                }
            };
            if is_code_bucket(key) {
                projection.push(
                    CODES_METRIC,
                    ProjectedValue::labelled(value, [("code", key.as_str())]),
                );
            } else {
                projection.set(key, ProjectedValue::scalar(value));
            }
        }
        Ok(projection)
    }
}

/// Top-level numbers map 1:1 to unlabelled metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatProjector {
    reserved: &'static [&'static str],
}

impl FlatProjector {
    pub const fn new() -> Self {
        Self { reserved: &[] }
    }

    /// Skip top-level fields named like metrics another projector builds.
    pub const fn reserving(reserved: &'static [&'static str]) -> Self {
        Self { reserved }
    }
}

impl Projector for FlatProjector {
    fn project(&self, method: &str, root: &DecodedField) -> CollectorResult<Projection> {
        let mut projection = Projection::default();
        for (key, field) in top_level(method, root)? {
            if self.reserved.contains(&key.as_str()) {
                debug!(method, field = %key, "skipping reserved field");
                continue;
            }
            match field.as_number() {
                Ok(value) => projection.set(key, ProjectedValue::scalar(value)),
                Err(e) => debug!(method, field = %key, error = %e, "skipping field"),
            }
        }
        Ok(projection)
    }
}

// ── Dispatcher ──────────────────────────────────────────────────────

/// A destination of a dispatcher set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherTarget {
    pub uri: String,
    pub flags: String,
    pub set_id: i64,
}

/// Walk `RECORDS → SET → TARGETS → DEST` and collect every destination.
///
/// Each set needs a non-zero integer `ID`. `URI` and `FLAGS` are
/// best-effort and default to empty.
pub fn parse_dispatcher_targets(
    method: &str,
    root: &DecodedField,
) -> CollectorResult<Vec<DispatcherTarget>> {
    let structural = |node: &'static str| {
        move |e: DecodeError| CollectorError::malformed(method, format!("{node}: {e}"))
    };

    let mut result = Vec::new();
    top_level(method, root)?;

    for records in root.children("RECORDS") {
        records.as_group().map_err(structural("RECORDS"))?;

        for set in records.children("SET") {
            let mut set_id = None;
            let mut targets = Vec::new();

            for (key, value) in set.as_group().map_err(structural("SET"))? {
                match key.as_str() {
                    "ID" => set_id = Some(value.as_int().map_err(structural("ID"))?),
                    "TARGETS" => {
                        value.as_group().map_err(structural("TARGETS"))?;
                        for dest in value.children("DEST") {
                            dest.as_group().map_err(structural("DEST"))?;
                            targets.push((best_effort(dest, "URI"), best_effort(dest, "FLAGS")));
                        }
                    }
                    _ => {}
                }
            }

            let set_id = match set_id {
                Some(id) if id != 0 => id,
                _ => {
                    return Err(CollectorError::MissingSetId {
                        method: method.to_string(),
                    });
                }
            };

            result.extend(targets.into_iter().map(|(uri, flags)| DispatcherTarget {
                uri,
                flags,
                set_id,
            }));
        }
    }

    Ok(result)
}

fn best_effort(node: &DecodedField, key: &str) -> String {
    node.get(key)
        .and_then(|field| field.as_label().ok())
        .unwrap_or_default()
}

/// One `target` sample per dispatcher destination.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatcherProjector;

impl Projector for DispatcherProjector {
    fn project(&self, method: &str, root: &DecodedField) -> CollectorResult<Projection> {
        let mut projection = Projection::default();
        for target in parse_dispatcher_targets(method, root)? {
            projection.push(
                TARGET_METRIC,
                ProjectedValue::labelled(
                    1.0,
                    [
                        ("uri", target.uri),
                        ("flags", target.flags),
                        ("setid", target.set_id.to_string()),
                    ],
                ),
            );
        }
        Ok(projection)
    }
}

// ── Peers ───────────────────────────────────────────────────────────

/// A cluster peer entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub host: String,
    pub status: String,
    /// Opaque; rendered as text whatever its wire type.
    pub local: String,
}

/// Collect every group carrying a `host` member, at any depth.
pub fn parse_peers(root: &DecodedField) -> Vec<Peer> {
    let mut peers = Vec::new();
    collect_peers(root, &mut peers);
    peers
}

fn collect_peers(node: &DecodedField, peers: &mut Vec<Peer>) {
    let Ok(items) = node.as_group() else {
        return;
    };

    let member = |name: &str| {
        items
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    };

    if let Some(host) = member("host") {
        match host.as_label() {
            Ok(host) => peers.push(Peer {
                host,
                status: member("status")
                    .and_then(|f| f.as_label().ok())
                    .unwrap_or_default(),
                local: member("local")
                    .and_then(|f| f.as_label().ok())
                    .unwrap_or_default(),
            }),
            Err(e) => debug!(error = %e, "skipping peer with unreadable host"),
        }
        return;
    }

    for (_, child) in items {
        collect_peers(child, peers);
    }
}

/// One `peer` sample of value 1 per resolved peer entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerProjector;

impl Projector for PeerProjector {
    fn project(&self, method: &str, root: &DecodedField) -> CollectorResult<Projection> {
        top_level(method, root)?;
        let mut projection = Projection::default();
        for peer in parse_peers(root) {
            projection.push(
                PEER_METRIC,
                ProjectedValue::labelled(
                    1.0,
                    [
                        ("host", peer.host),
                        ("status", peer.status),
                        ("local", peer.local),
                    ],
                ),
            );
        }
        Ok(projection)
    }
}

// ── Composite ───────────────────────────────────────────────────────

/// Runs several projectors over the same reply and merges their output.
#[derive(Debug, Default)]
pub struct CompositeProjector {
    parts: Vec<Box<dyn Projector>>,
}

impl CompositeProjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, projector: impl Projector + 'static) -> Self {
        self.parts.push(Box::new(projector));
        self
    }
}

impl Projector for CompositeProjector {
    fn project(&self, method: &str, root: &DecodedField) -> CollectorResult<Projection> {
        let mut projection = Projection::default();
        for part in &self.parts {
            projection.merge(part.project(method, root)?);
        }
        Ok(projection)
    }
}
