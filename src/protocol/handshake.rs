//! Challenge/response handshake deriving the session cipher.
//!
//! The server issues a random challenge after `auth`. Both sides derive two
//! direction keys with HKDF-SHA256 (salt = challenge, input key material = the
//! shared secret, info = direction label ‖ account id). The client proves it
//! holds the secret by returning the first client→server ciphertext: the
//! encryption of `account ‖ challenge`.
//!
//! Everything is a pure function of (account, secret, challenge); nothing is
//! persisted and a fresh handshake follows every new connection.
//!
//! **Per-Session State**
//! Key material lives only inside the returned handshake values and the
//! [`FrameCipher`]s built from them, so two connections can never share or
//! trample each other's cipher state.

use crate::error::{constants, ProtocolError, Result};
use crate::utils::crypto::FrameCipher;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[allow(unused_imports)]
use tracing::{debug, instrument, warn};

/// Length of server-issued challenges
pub const CHALLENGE_LEN: usize = 20;

const CLIENT_TO_SERVER: &[u8] = b"funxmpp client->server ";
const SERVER_TO_CLIENT: &[u8] = b"funxmpp server->client ";

/// Direction keys for one connection
#[derive(Zeroize, ZeroizeOnDrop)]
struct SessionKeys {
    client_to_server: [u8; 32],
    server_to_client: [u8; 32],
}

/// Derive both direction keys
fn derive_session_keys(account: &str, secret: &[u8], challenge: &[u8]) -> Result<SessionKeys> {
    let hk = Hkdf::<Sha256>::new(Some(challenge), secret);
    let mut keys = SessionKeys {
        client_to_server: [0u8; 32],
        server_to_client: [0u8; 32],
    };

    let mut info = Vec::with_capacity(CLIENT_TO_SERVER.len() + account.len());
    info.extend_from_slice(CLIENT_TO_SERVER);
    info.extend_from_slice(account.as_bytes());
    hk.expand(&info, &mut keys.client_to_server)
        .map_err(|_| ProtocolError::HandshakeError(constants::ERR_KEY_DERIVATION.into()))?;

    info.clear();
    info.extend_from_slice(SERVER_TO_CLIENT);
    info.extend_from_slice(account.as_bytes());
    hk.expand(&info, &mut keys.server_to_client)
        .map_err(|_| ProtocolError::HandshakeError(constants::ERR_KEY_DERIVATION.into()))?;

    Ok(keys)
}

/// Plaintext proven by the response token
fn proof_plaintext(account: &str, challenge: &[u8]) -> Vec<u8> {
    let mut proof = Vec::with_capacity(account.len() + challenge.len());
    proof.extend_from_slice(account.as_bytes());
    proof.extend_from_slice(challenge);
    proof
}

/// Client result of a handshake: the token to send back and the transforms to
/// install on the Writer (`encrypt`) and Reader (`decrypt`).
#[derive(Debug)]
pub struct ClientHandshake {
    pub response: Vec<u8>,
    pub encrypt: FrameCipher,
    pub decrypt: FrameCipher,
}

/// Server mirror of the handshake, used to verify a client's response.
#[derive(Debug)]
pub struct ServerHandshake {
    expected: Vec<u8>,
    pub encrypt: FrameCipher,
    pub decrypt: FrameCipher,
}

/// Runs the client side of the handshake.
///
/// # Errors
/// Returns `ProtocolError::HandshakeError` if key derivation fails
#[instrument(skip_all, fields(account = %account, challenge_len = challenge.len()))]
pub fn client_handshake(account: &str, secret: &[u8], challenge: &[u8]) -> Result<ClientHandshake> {
    let mut keys = derive_session_keys(account, secret, challenge)?;
    let mut encrypt = FrameCipher::new(&mut keys.client_to_server);
    let decrypt = FrameCipher::new(&mut keys.server_to_client);

    let response = encrypt.encrypt(&proof_plaintext(account, challenge))?;

    debug!("Client derived session cipher");

    Ok(ClientHandshake {
        response,
        encrypt,
        decrypt,
    })
}

/// The token a client with this secret answers `challenge` with.
pub fn response_token(account: &str, secret: &[u8], challenge: &[u8]) -> Result<Vec<u8>> {
    Ok(client_handshake(account, secret, challenge)?.response)
}

/// Prepares the server side of the handshake for `challenge`.
///
/// # Errors
/// Returns `ProtocolError::HandshakeError` if key derivation fails
#[instrument(skip_all, fields(account = %account))]
pub fn server_handshake(account: &str, secret: &[u8], challenge: &[u8]) -> Result<ServerHandshake> {
    let mut keys = derive_session_keys(account, secret, challenge)?;

    Ok(ServerHandshake {
        expected: proof_plaintext(account, challenge),
        encrypt: FrameCipher::new(&mut keys.server_to_client),
        decrypt: FrameCipher::new(&mut keys.client_to_server),
    })
}

impl ServerHandshake {
    /// Checks a client's response token. Consumes one inbound frame nonce, as
    /// the client consumed one outbound nonce producing it.
    ///
    /// # Errors
    /// Returns `ProtocolError::HandshakeError` if the token does not decrypt to
    /// the expected proof
    pub fn verify_response(&mut self, token: &[u8]) -> Result<()> {
        let proof = self
            .decrypt
            .decrypt(token)
            .map_err(|_| ProtocolError::HandshakeError(constants::ERR_RESPONSE_MISMATCH.into()))?;

        if proof != self.expected {
            warn!("Response token decrypted to an unexpected proof");
            return Err(ProtocolError::HandshakeError(
                constants::ERR_RESPONSE_MISMATCH.into(),
            ));
        }

        debug!("Server verified client response");
        Ok(())
    }

    /// Split into (encrypt, decrypt) transforms.
    pub fn into_ciphers(self) -> (FrameCipher, FrameCipher) {
        (self.encrypt, self.decrypt)
    }
}

/// Generate a cryptographically secure random challenge
pub fn generate_challenge() -> [u8; CHALLENGE_LEN] {
    let mut challenge = [0u8; CHALLENGE_LEN];
    rand::rng().fill_bytes(&mut challenge);
    challenge
}
