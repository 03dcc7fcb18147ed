//! # Transport Layer
//!
//! TCP connection lifecycle and endpoint resolution.
//!
//! ## Components
//! - **Resolver**: seam producing candidate addresses (system DNS or a fixed list)
//! - **Connection**: connect with retry and port rotation, bounded reads, teardown

pub mod connection;
pub mod resolver;

pub use connection::{Connection, ConnectionState, ReadOutcome};
pub use resolver::{DnsResolver, Resolver, StaticResolver};
