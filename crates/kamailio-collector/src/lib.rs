//! kamailio-collector: turns Kamailio RPC replies into metric samples.
//!
//! # Architecture
//!
//! ```text
//! Collector::collect(sink)
//!   ├── Connector::connect()            one connection per cycle
//!   ├── for each configured method
//!   │     ├── RpcConnection::call()     → Vec<Record>
//!   │     ├── decode_response()         → DecodedField tree
//!   │     └── Projector::project()      → Projection → MetricSample
//!   ├── RpcConnection::close()
//!   └── ExporterHealth::samples()       always emitted last
//! ```
//!
//! The [`Catalog`] binds each supported method to its metric definitions
//! and its [`Projector`].

pub mod catalog;
pub mod collector;
pub mod config;
pub mod decode;
pub mod error;
pub mod health;
pub mod project;
pub mod sample;
pub mod sink;
pub mod transport;

pub use catalog::{Catalog, MethodEntry, MetricDefinition, MetricKind};
pub use collector::{Collector, ScrapeFailure, ScrapeOutcome, ScrapePhase};
pub use config::CollectorConfig;
pub use decode::{DecodedField, decode_response};
pub use error::{CollectorError, CollectorResult, DecodeError};
pub use health::ExporterHealth;
pub use project::{Projection, Projector};
pub use sample::MetricSample;
pub use sink::{MetricSink, PrometheusSink};
pub use transport::{BinRpcConnector, Connector, RpcConnection};
