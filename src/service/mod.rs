//! # Service Layer
//!
//! The client session composing transport, codec and correlation.

pub mod client;

pub use client::{Client, Credentials};
