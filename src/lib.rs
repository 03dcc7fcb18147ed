//! # funxmpp
//!
//! Client for FunXMPP, the binary XMPP-derived messaging protocol: a
//! persistent TCP session carrying tree-structured nodes over a byte stream
//! that switches from cleartext to a ChaCha20-Poly1305 session cipher after a
//! challenge/response handshake.
//!
//! ## Layers
//! - [`core`]: nodes, token dictionary, framing and the incremental codec
//! - [`protocol`]: handshake, built-in reactions, request correlation, stanza builders
//! - [`transport`]: endpoint resolution and the TCP connection lifecycle
//! - [`service`]: the [`Client`] session
//! - [`config`], [`error`], [`utils`]: configuration, errors, logging and timing
//!
//! ## Concurrency
//! The client is single-threaded and cooperative. Inbound traffic is only
//! processed while the caller pumps, directly or through a blocking wait;
//! every wait accepts a deadline and a cancellation token.

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::config::Config;
pub use crate::core::node::{AttrValue, Attributes, Node};
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::dispatcher::{Reply, RequestHandle};
pub use crate::protocol::stanza::{ChatState, Recipient};
pub use crate::service::{Client, Credentials};
pub use crate::transport::ConnectionState;
pub use crate::utils::timeout::Wait;
pub use tokio_util::sync::CancellationToken;
