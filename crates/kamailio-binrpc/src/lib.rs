//! kamailio-binrpc: client side of Kamailio's binary RPC protocol.
//!
//! Encodes method calls, decodes replies into [`Record`] trees, and carries
//! them over a tcp or unix control socket.
//!
//! # Architecture
//!
//! ```text
//! Connection::dial(endpoint, timeout)
//!   └── call(method)
//!         ├── encode_request() → packet bytes
//!         ├── write (deadline)
//!         └── read_packet() → Vec<Record> (cookie checked)
//! ```

pub mod error;
pub mod packet;
pub mod record;
pub mod transport;

pub use error::{BinRpcError, BinRpcResult};
pub use packet::{Header, read_packet, write_packet};
pub use record::{Record, StructItem};
pub use transport::{Connection, Endpoint};
