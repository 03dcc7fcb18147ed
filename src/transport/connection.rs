//! # Connection Lifecycle
//!
//! One TCP connection and its lifecycle state:
//!
//! ```text
//! Unresolved → Resolved → Connecting → Established
//!                                         ├→ ClosedByPeer    (EOF, terminator)
//!                                         ├→ ClosedByError   (I/O failure)
//!                                         └→ ClosedByCaller  (close)
//! ```
//!
//! Endpoint candidates are resolved lazily, cached, and consumed in order.
//! Each resolution uses the next port of the configured rotation. A closed
//! connection drops its socket; sending afterwards fails with
//! [`ProtocolError::NotConnected`]. Nothing reconnects on its own.

use bytes::BytesMut;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, info, instrument, warn};

use crate::config::TransportConfig;
use crate::error::{ProtocolError, Result};
use crate::transport::resolver::Resolver;
use crate::utils::timeout::{with_timeout_error, SHUTDOWN_TIMEOUT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unresolved,
    Resolved,
    Connecting,
    Established,
    ClosedByPeer,
    ClosedByError,
    ClosedByCaller,
}

impl ConnectionState {
    pub fn is_closed(self) -> bool {
        matches!(
            self,
            ConnectionState::ClosedByPeer
                | ConnectionState::ClosedByError
                | ConnectionState::ClosedByCaller
        )
    }
}

/// Result of one bounded read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were appended to the buffer.
    Data(usize),
    /// Nothing arrived within the poll window.
    Idle,
    /// The peer closed the socket.
    Closed,
}

pub struct Connection {
    host: String,
    ports: Vec<u16>,
    port_index: usize,
    connect_timeout: Duration,
    resolver: Arc<dyn Resolver>,
    candidates: VecDeque<SocketAddr>,
    stream: Option<TcpStream>,
    state: ConnectionState,
}

impl Connection {
    pub fn new(config: &TransportConfig, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            host: config.host.clone(),
            ports: config.ports.clone(),
            port_index: 0,
            connect_timeout: config.connect_timeout,
            resolver,
            candidates: VecDeque::new(),
            stream: None,
            state: ConnectionState::Unresolved,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }

    /// Refill the candidate cache from the next port in the rotation.
    async fn resolve(&mut self) -> Result<()> {
        let Some(&port) = self.ports.get(self.port_index) else {
            return Err(ProtocolError::NoEndpoints(self.host.clone()));
        };
        self.port_index = (self.port_index + 1) % self.ports.len();

        let addrs = self.resolver.resolve(&self.host, port).await?;
        if addrs.is_empty() {
            return Err(ProtocolError::NoEndpoints(self.host.clone()));
        }

        debug!(host = %self.host, port, candidates = addrs.len(), "Resolved endpoints");
        self.candidates.extend(addrs);
        self.state = ConnectionState::Resolved;
        Ok(())
    }

    /// Connect, spending at most `tries` candidates.
    ///
    /// # Errors
    /// `AlreadyConnected` when a socket is open, `NoEndpoints` when resolution
    /// yields nothing, `ConnectError` carrying the last failure once the budget
    /// is spent
    #[instrument(skip(self), fields(host = %self.host))]
    pub async fn connect(&mut self, tries: u32) -> Result<()> {
        if self.stream.is_some() {
            return Err(ProtocolError::AlreadyConnected);
        }

        let mut last_error = None;
        let mut attempts = 0;
        for attempt in 1..=tries {
            if self.candidates.is_empty() {
                if let Err(e) = self.resolve().await {
                    // A failed re-resolution ends the budget; report the connect failure
                    let Some(source) = last_error else {
                        return Err(e);
                    };
                    warn!(error = %e, "Re-resolution failed after a connect failure");
                    self.state = ConnectionState::ClosedByError;
                    return Err(ProtocolError::ConnectError { attempts, source });
                }
            }
            let Some(addr) = self.candidates.pop_front() else {
                return Err(ProtocolError::NoEndpoints(self.host.clone()));
            };

            self.state = ConnectionState::Connecting;
            attempts = attempt;
            debug!(%addr, attempt, tries, "Connecting");

            match time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    stream.set_nodelay(true)?;
                    self.stream = Some(stream);
                    self.state = ConnectionState::Established;
                    info!(%addr, attempt, "Connected");
                    return Ok(());
                }
                Ok(Err(e)) => {
                    warn!(%addr, attempt, tries, error = %e, "Connect attempt failed");
                    last_error = Some(e);
                }
                Err(_) => {
                    warn!(%addr, attempt, tries, "Connect attempt timed out");
                    last_error = Some(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect to {addr} timed out"),
                    ));
                }
            }
        }

        self.state = ConnectionState::ClosedByError;
        Err(ProtocolError::ConnectError {
            attempts,
            source: last_error.unwrap_or_else(|| io::Error::other("no connection attempts made")),
        })
    }

    /// Write all of `bytes`. A write failure closes the connection.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(ProtocolError::NotConnected)?;
        if let Err(e) = stream.write_all(bytes).await {
            warn!(error = %e, "Write failed, closing connection");
            self.mark_closed(ConnectionState::ClosedByError);
            return Err(e.into());
        }
        Ok(())
    }

    /// Read whatever arrives within `wait` into `buf`.
    pub async fn read_available(&mut self, buf: &mut BytesMut, wait: Duration) -> Result<ReadOutcome> {
        let stream = self.stream.as_mut().ok_or(ProtocolError::NotConnected)?;

        match time::timeout(wait, stream.read_buf(buf)).await {
            Err(_) => Ok(ReadOutcome::Idle),
            Ok(Ok(0)) => {
                debug!("Socket closed by peer");
                self.mark_closed(ConnectionState::ClosedByPeer);
                Ok(ReadOutcome::Closed)
            }
            Ok(Ok(n)) => Ok(ReadOutcome::Data(n)),
            Ok(Err(e)) => {
                warn!(error = %e, "Read failed, closing connection");
                self.mark_closed(ConnectionState::ClosedByError);
                Err(e.into())
            }
        }
    }

    /// Drop the socket and record why.
    pub fn mark_closed(&mut self, state: ConnectionState) {
        self.stream = None;
        self.state = state;
    }

    /// Caller-initiated close: flush, shut down the write half, drop the socket.
    pub async fn shutdown(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let flush = async { stream.shutdown().await.map_err(ProtocolError::from) };
            if let Err(e) = with_timeout_error(flush, SHUTDOWN_TIMEOUT).await {
                debug!(error = %e, "Socket shutdown incomplete");
            }
        }
        self.state = ConnectionState::ClosedByCaller;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .field("state", &self.state)
            .field("candidates", &self.candidates.len())
            .finish_non_exhaustive()
    }
}
