//! ChaCha20-Poly1305 frame cipher.
//!
//! One `FrameCipher` per direction. Every call consumes the next nonce from a
//! 64-bit counter, so both peers stay in lockstep as long as frames are
//! processed in order.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use std::fmt;
use zeroize::Zeroize;

use crate::error::{constants, ProtocolError, Result};

/// Poly1305 tag length appended to every ciphertext
pub const TAG_LEN: usize = 16;

pub struct FrameCipher {
    cipher: ChaCha20Poly1305,
    counter: u64,
}

impl FrameCipher {
    /// Build a cipher from a 32-byte key. The caller's key copy is zeroized.
    pub fn new(key: &mut [u8; 32]) -> Self {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_slice()));
        key.zeroize();
        Self { cipher, counter: 0 }
    }

    /// Number of frames processed so far.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    fn next_nonce(&mut self) -> Result<[u8; 12]> {
        let mut nonce = [0u8; 12];
        nonce[4..].copy_from_slice(&self.counter.to_le_bytes());
        self.counter = self
            .counter
            .checked_add(1)
            .ok_or_else(|| ProtocolError::HandshakeError(constants::ERR_NONCE_EXHAUSTED.into()))?;
        Ok(nonce)
    }

    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = self.next_nonce()?;
        self.cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| ProtocolError::EncryptionFailure)
    }

    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < TAG_LEN {
            return Err(ProtocolError::DecryptionFailure);
        }
        let nonce = self.next_nonce()?;
        self.cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext)
            .map_err(|_| ProtocolError::DecryptionFailure)
    }
}

impl fmt::Debug for FrameCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameCipher")
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}
