//! # Protocol Layer
//!
//! Session semantics above the wire codec.
//!
//! ## Components
//! - **Handshake**: challenge/response key derivation for the session cipher
//! - **Reactions**: inbound nodes the client answers without a waiter
//! - **Dispatcher**: correlation of inbound nodes with pending requests
//! - **Stanza**: constructors for outbound nodes

pub mod dispatcher;
pub mod handshake;
pub mod reactions;
pub mod stanza;
