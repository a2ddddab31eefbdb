//! Connection management for talking to a Kamailio control socket.
//!
//! A [`Connection`] is dialled with a single timeout. The same timeout
//! bounds the connect and then becomes a fixed deadline for every read and
//! write made on the connection afterwards.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::debug;

use crate::error::{BinRpcError, BinRpcResult};
use crate::packet::{encode_request, read_packet};
use crate::record::Record;

/// Where the control socket lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `host:port`
    Tcp(String),
    /// Filesystem path of a unix stream socket.
    Unix(PathBuf),
}

impl Endpoint {
    pub fn scheme(&self) -> &'static str {
        match self {
            Endpoint::Tcp(_) => "tcp",
            Endpoint::Unix(_) => "unix",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

/// An open BINRPC connection with a fixed I/O deadline.
pub struct Connection {
    stream: Stream,
    deadline: Instant,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.stream {
            Stream::Tcp(_) => "tcp",
            #[cfg(unix)]
            Stream::Unix(_) => "unix",
        };
        f.debug_struct("Connection")
            .field("scheme", &scheme)
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl Connection {
    /// Connect to `endpoint`. `io_timeout` bounds the connect; once
    /// connected, all further I/O must finish within `io_timeout` of now.
    pub async fn dial(endpoint: &Endpoint, io_timeout: Duration) -> BinRpcResult<Self> {
        let stream = timeout(io_timeout, connect(endpoint))
            .await
            .map_err(|_| BinRpcError::Timeout("connect"))??;
        debug!(%endpoint, "binrpc connection established");
        Ok(Self {
            stream,
            deadline: Instant::now() + io_timeout,
        })
    }

    /// Call a method without parameters and return the reply records.
    pub async fn call(&mut self, method: &str) -> BinRpcResult<Vec<Record>> {
        self.call_with(method, &[]).await
    }

    /// Call a method with parameters and return the reply records.
    pub async fn call_with(&mut self, method: &str, params: &[Record]) -> BinRpcResult<Vec<Record>> {
        let cookie = new_cookie()?;
        let request = encode_request(cookie, method, params);
        let deadline = self.deadline;
        let records = match &mut self.stream {
            Stream::Tcp(s) => exchange(s, &request, cookie, deadline).await?,
            #[cfg(unix)]
            Stream::Unix(s) => exchange(s, &request, cookie, deadline).await?,
        };
        debug!(method, records = records.len(), "binrpc reply received");
        Ok(records)
    }

    /// Shut the stream down. Dropping the connection also closes it.
    pub async fn close(mut self) {
        let result = match &mut self.stream {
            Stream::Tcp(s) => s.shutdown().await,
            #[cfg(unix)]
            Stream::Unix(s) => s.shutdown().await,
        };
        if let Err(e) = result {
            debug!(error = %e, "binrpc connection shutdown failed");
        }
    }
}

async fn connect(endpoint: &Endpoint) -> BinRpcResult<Stream> {
    match endpoint {
        Endpoint::Tcp(addr) => Ok(Stream::Tcp(TcpStream::connect(addr.as_str()).await?)),
        #[cfg(unix)]
        Endpoint::Unix(path) => Ok(Stream::Unix(UnixStream::connect(path).await?)),
        #[cfg(not(unix))]
        Endpoint::Unix(_) => Err(BinRpcError::Io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "unix sockets are not available on this platform",
        ))),
    }
}

async fn exchange<S>(
    stream: &mut S,
    request: &[u8],
    cookie: u32,
    deadline: Instant,
) -> BinRpcResult<Vec<Record>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    timeout_at(deadline, stream.write_all(request))
        .await
        .map_err(|_| BinRpcError::Timeout("write"))??;

    let (header, records) = timeout_at(deadline, read_packet(stream))
        .await
        .map_err(|_| BinRpcError::Timeout("read"))??;

    if header.cookie != cookie {
        return Err(BinRpcError::CookieMismatch {
            expected: cookie,
            got: header.cookie,
        });
    }
    Ok(records)
}

fn new_cookie() -> BinRpcResult<u32> {
    let mut bytes = [0u8; 4];
    getrandom::getrandom(&mut bytes).map_err(|e| BinRpcError::Cookie(e.to_string()))?;
    Ok(u32::from_be_bytes(bytes))
}
