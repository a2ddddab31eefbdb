//! Transport seam between the orchestrator and the control socket.
//!
//! The orchestrator only needs to open a connection, call methods on it in
//! order and close it. [`BinRpcConnector`] does that over BINRPC; tests
//! swap in scripted connectors.

use std::future::Future;
use std::time::Duration;

use kamailio_binrpc::{BinRpcResult, Connection, Endpoint, Record};

/// Opens one connection per scrape cycle.
pub trait Connector: Send + Sync {
    type Connection: RpcConnection;

    fn connect(&self) -> impl Future<Output = BinRpcResult<Self::Connection>> + Send;

    /// Human-readable target, for logs.
    fn describe(&self) -> String;
}

/// An open connection that executes method calls in order.
pub trait RpcConnection: Send {
    fn call(&mut self, method: &str) -> impl Future<Output = BinRpcResult<Vec<Record>>> + Send;

    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Dials a Kamailio control socket over BINRPC.
#[derive(Debug, Clone)]
pub struct BinRpcConnector {
    endpoint: Endpoint,
    timeout: Duration,
}

impl BinRpcConnector {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Connector for BinRpcConnector {
    type Connection = Connection;

    async fn connect(&self) -> BinRpcResult<Connection> {
        Connection::dial(&self.endpoint, self.timeout).await
    }

    fn describe(&self) -> String {
        self.endpoint.to_string()
    }
}

impl RpcConnection for Connection {
    async fn call(&mut self, method: &str) -> BinRpcResult<Vec<Record>> {
        Connection::call(self, method).await
    }

    async fn close(self) {
        Connection::close(self).await
    }
}
