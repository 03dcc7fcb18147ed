//! # Core Wire Components
//!
//! Node trees, the token dictionary, framing and the Reader/Writer codec.
//!
//! ## Components
//! - **Node**: tree-structured message unit
//! - **Token**: single-byte dictionary for frequent strings
//! - **Frame**: 3-byte header envelope and a tokio codec splitting streams into frames
//! - **Codec**: incremental tree decoding and encoding, with optional session cipher
//!
//! ## Wire Format
//! ```text
//! "WA" 0x01 0x02                          (client preamble, once)
//! [flags(4) | len(20)] [body(len)]        (every frame)
//! ```
//!
//! ## Security
//! - Maximum frame body: 1MB (20-bit length)
//! - Nesting depth bounded at 64
//! - Headers are never encrypted; bodies authenticate with Poly1305

pub mod codec;
pub mod frame;
pub mod node;
pub mod token;
