//! # Error Types
//!
//! Error handling for the FunXMPP client.
//!
//! This module defines every failure the client can surface, from socket errors
//! to peer-reported stream errors and failed correlated requests.
//!
//! ## Error Categories
//! - **Transport**: I/O failures, exhausted connection attempts, closed sessions
//! - **Stream**: malformed frames, peer stream errors, end of stream
//! - **Cryptographic**: handshake, encryption and decryption failures
//! - **Request**: application-level failures delivered to a single waiter
//! - **Wait**: timeouts and cancellation of blocking waits
//!
//! Needing more bytes is not an error: the reader reports it as
//! [`Decoded::Incomplete`](crate::core::codec::Decoded::Incomplete).
//!
//! ## Example Usage
//! ```rust
//! use funxmpp::error::{ProtocolError, Result};
//! use tracing::error;
//!
//! fn parse_seconds(raw: &str) -> Result<u64> {
//!     raw.parse()
//!         .map_err(|_| ProtocolError::RequestError(format!("bad seconds value: {raw}")))
//! }
//!
//! fn main() {
//!     if let Err(e) = parse_seconds("soon") {
//!         error!(error = %e, "Last-seen query failed");
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Handshake errors
    pub const ERR_KEY_DERIVATION: &str = "Key derivation failed";
    pub const ERR_HANDSHAKE_REPEATED: &str = "Handshake already completed on this connection";
    pub const ERR_RESPONSE_MISMATCH: &str = "Response token does not match challenge";
    pub const ERR_NONCE_EXHAUSTED: &str = "Frame counter exhausted";

    /// Codec errors
    pub const ERR_EMPTY_NODE: &str = "Node list is empty";
    pub const ERR_TRAILING_BYTES: &str = "Trailing bytes after node";
    pub const ERR_TOO_DEEP: &str = "Node nesting exceeds maximum depth";
    pub const ERR_TRUNCATED: &str = "Frame body truncated";
    pub const ERR_CHILDREN_AND_PAYLOAD: &str = "Node carries both children and payload";
    pub const ERR_EMPTY_NAME: &str = "Node name cannot be empty";
    pub const ERR_STREAM_STARTED: &str = "Stream preamble already written";
    pub const ERR_LIST_TOO_LARGE: &str = "Node list exceeds 65535 items";
    pub const ERR_RESERVED_NAME: &str = "stream:end is reserved for the stream terminator";
    pub const ERR_PLAIN_AFTER_CIPHER: &str = "Cleartext frame after the session cipher was installed";

    /// Session errors
    pub const ERR_STREAM_ERROR_UNKNOWN: &str = "unknown";
    pub const ERR_LOGIN_FAILED: &str = "not-authorized";
}

/// ProtocolError is the primary error type for all client operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection failed after {attempts} attempts: {source}")]
    ConnectError {
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("No endpoints resolved for {0}")]
    NoEndpoints(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Stream ended")]
    StreamEnded,

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Frame too large: {0} bytes")]
    OversizedFrame(usize),

    #[error("Encrypted frame received before the session cipher was installed")]
    CipherNotInstalled,

    #[error("Handshake failed: {0}")]
    HandshakeError(String),

    #[error("Encryption failed")]
    EncryptionFailure,

    #[error("Decryption failed")]
    DecryptionFailure,

    #[error("Request failed: {0}")]
    RequestError(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Wait cancelled")]
    Cancelled,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProtocolError {
    /// Whether this error ends the session (the connection is unusable afterwards).
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ProtocolError::RequestError(_)
                | ProtocolError::Timeout
                | ProtocolError::Cancelled
                | ProtocolError::InvalidArgument(_)
                | ProtocolError::ConfigError(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
