//! # Utility Modules
//!
//! Supporting utilities for cryptography, logging, and timing.
//!
//! ## Components
//! - **Crypto**: ChaCha20-Poly1305 frame cipher with counter nonces
//! - **Logging**: Structured logging configuration
//! - **Time**: Timestamps and message id generation
//! - **Timeout**: Timeout constants and bounded waits
//!
//! ## Security
//! - Cryptographically secure RNG for challenges (rand)
//! - Memory zeroing for key material (zeroize crate)

pub mod crypto;
pub mod logging;
pub mod time;
pub mod timeout;

pub use timeout::Wait;
