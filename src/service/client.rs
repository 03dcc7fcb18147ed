//! # Client Session
//!
//! [`Client`] owns one connection, its Reader/Writer pair, the correlation
//! registry and the inbox. Every operation takes `&mut self`; nothing runs in
//! the background. Inbound traffic is only processed while the caller is
//! inside [`Client::pump`] or one of the blocking waits built on it.
//!
//! Processing order for each inbound node: built-in reactions first (which
//! may send replies, install the session cipher, or enqueue the node), then
//! delivery to registered requests.
//!
//! ```rust,no_run
//! use funxmpp::{Client, Config, Credentials};
//!
//! # async fn run() -> funxmpp::Result<()> {
//! let credentials = Credentials::new("31612345678", b"secret".to_vec()).with_nickname("bob");
//! let mut client = Client::new(Config::default(), credentials)?;
//! client.login().await?;
//! let id = client.message("31687654321", "hello").await?;
//! let seconds = client.last_seen("31687654321").await?;
//! client.close().await?;
//! # let _ = (id, seconds);
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

use crate::config::Config;
use crate::core::codec::{Decoded, Reader, Writer};
use crate::core::node::{AttrValue, Attributes, Node};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::dispatcher::{Dispatcher, Reply, RequestHandle};
use crate::protocol::handshake::client_handshake;
use crate::protocol::reactions::{react, Action};
use crate::protocol::stanza::{self, ChatState, Recipient};
use crate::transport::{Connection, ConnectionState, DnsResolver, ReadOutcome, Resolver};
use crate::utils::time::MessageIdGenerator;
use crate::utils::timeout::Wait;

/// Account credentials. The secret is wiped from memory on drop.
#[derive(Clone)]
pub struct Credentials {
    pub account: String,
    secret: Zeroizing<Vec<u8>>,
    pub nickname: Option<String>,
}

impl Credentials {
    pub fn new(account: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            account: account.into(),
            secret: Zeroizing::new(secret.into()),
            nickname: None,
        }
    }

    /// Name announced with presence after login.
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.account)
            .field("secret", &"<redacted>")
            .field("nickname", &self.nickname)
            .finish()
    }
}

/// Condition named by an error-carrying node: its first child's name.
fn condition_of(node: Option<&Node>, fallback: &str) -> String {
    node.and_then(Node::first_child)
        .map(|c| c.name().to_string())
        .unwrap_or_else(|| fallback.to_string())
}

pub struct Client {
    config: Config,
    credentials: Credentials,
    connection: Connection,
    reader: Reader,
    writer: Writer,
    dispatcher: Dispatcher,
    inbox: VecDeque<Node>,
    account_info: Option<Attributes>,
    ids: MessageIdGenerator,
    handshake_done: bool,
}

impl Client {
    /// Client resolving endpoints through the system resolver.
    ///
    /// # Errors
    /// Returns `ProtocolError::ConfigError` if the configuration does not validate
    pub fn new(config: Config, credentials: Credentials) -> Result<Self> {
        Self::with_resolver(config, credentials, Arc::new(DnsResolver))
    }

    pub fn with_resolver(
        config: Config,
        credentials: Credentials,
        resolver: Arc<dyn Resolver>,
    ) -> Result<Self> {
        config.validate_strict()?;
        let connection = Connection::new(&config.transport, resolver);
        Ok(Self {
            config,
            credentials,
            connection,
            reader: Reader::new(),
            writer: Writer::new(),
            dispatcher: Dispatcher::new(),
            inbox: VecDeque::new(),
            account_info: None,
            ids: MessageIdGenerator::new(),
            handshake_done: false,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Attributes of the `success` node from the last login.
    pub fn account_info(&self) -> Option<&Attributes> {
        self.account_info.as_ref()
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Connect, open the stream, authenticate and announce presence.
    /// Returns the account info carried by `success`.
    ///
    /// # Errors
    /// Connection failures, `RequestError(condition)` when the server answers
    /// `failure`, `Timeout` after the configured request timeout, and any
    /// fatal stream error hit while waiting
    #[instrument(skip(self), fields(account = %self.credentials.account))]
    pub async fn login(&mut self) -> Result<Attributes> {
        if self.connection.is_connected() {
            return Err(ProtocolError::AlreadyConnected);
        }

        self.reader = Reader::new();
        self.writer = Writer::new();
        self.handshake_done = false;
        self.account_info = None;

        self.connection.connect(self.config.transport.connect_tries).await?;

        let preamble = self
            .writer
            .start_stream(&self.config.client.server, &self.config.client.version)?;
        self.write(&preamble).await?;
        self.send(&stanza::features(), false).await?;
        self.send(&stanza::auth(&self.credentials.account), false).await?;

        let success = self.register_interest("success", |node| Reply::Complete(node.clone()));
        let failure = self.register_interest("failure", |node| {
            Reply::Failed(ProtocolError::RequestError(condition_of(
                Some(node),
                constants::ERR_LOGIN_FAILED,
            )))
        });

        let wait = Wait::timeout(self.config.client.request_timeout);
        let node = match self.wait_any(&[success, failure], wait).await {
            Ok((_, node)) => node,
            Err(e) => {
                warn!(error = %e, "Login failed");
                if self.connection.is_connected() {
                    self.close().await?;
                }
                return Err(e);
            }
        };

        let info = node.into_attributes();
        self.account_info = Some(info.clone());

        let presence = stanza::presence(self.credentials.nickname.as_deref());
        self.send_stanza(&presence).await?;

        info!("Logged in");
        Ok(info)
    }

    /// Send the stream terminator and close the socket. Pending requests fail
    /// with `StreamEnded`. Closing a closed client does nothing.
    pub async fn close(&mut self) -> Result<()> {
        if !self.connection.is_connected() {
            return Ok(());
        }

        match self.writer.end_stream() {
            Ok(terminator) => {
                if let Err(e) = self.connection.send(&terminator).await {
                    debug!(error = %e, "Terminator not delivered");
                }
            }
            Err(e) => debug!(error = %e, "Terminator not encoded"),
        }
        self.connection.shutdown().await;
        self.dispatcher.fail_pending(|| ProtocolError::StreamEnded);
        info!("Connection closed");
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let result = self.connection.send(bytes).await;
        if result.is_err() && !self.connection.is_connected() {
            self.dispatcher.fail_pending(|| ProtocolError::StreamEnded);
        }
        result
    }

    /// Encode and write one node.
    ///
    /// # Errors
    /// `NotConnected` on a closed connection, `CipherNotInstalled` when
    /// encryption is requested before the handshake, `OversizedFrame` and
    /// `MalformedFrame` for nodes that cannot be framed (the session stays
    /// usable), cipher failures and I/O failures (which close the connection)
    pub async fn send(&mut self, node: &Node, encrypt: bool) -> Result<()> {
        if !self.connection.is_connected() {
            return Err(ProtocolError::NotConnected);
        }
        let bytes = match self.writer.node(node, encrypt) {
            Ok(bytes) => bytes,
            // The outbound nonce is spent; the peer can no longer follow
            Err(e @ (ProtocolError::EncryptionFailure | ProtocolError::HandshakeError(_))) => {
                warn!(error = %e, "Outbound cipher failed, closing connection");
                self.teardown(ConnectionState::ClosedByError);
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        self.write(&bytes).await
    }

    /// Send encrypted once the session cipher is installed, in clear before.
    async fn send_stanza(&mut self, node: &Node) -> Result<()> {
        let encrypt = self.writer.has_encrypt();
        self.send(node, encrypt).await
    }

    // ------------------------------------------------------------------
    // Correlation
    // ------------------------------------------------------------------

    /// Register a callback for inbound nodes named `name`.
    ///
    /// The callback sees every such node until it returns something other
    /// than [`Reply::Pending`]; it is responsible for recognising its own reply.
    pub fn register_interest<F>(&mut self, name: &str, callback: F) -> RequestHandle
    where
        F: FnMut(&Node) -> Reply + Send + 'static,
    {
        self.dispatcher.register(name, callback)
    }

    pub fn unregister(&mut self, handle: &RequestHandle) {
        self.dispatcher.unregister(handle);
    }

    /// Pump until `handle` completes, then return its result. The request is
    /// unregistered whichever way the wait ends.
    pub async fn wait_one(&mut self, handle: &RequestHandle, wait: Wait) -> Result<Node> {
        let poll = self.config.client.poll_interval;
        loop {
            if let Some(result) = self.dispatcher.complete(handle) {
                return result;
            }
            if !self.dispatcher.is_registered(handle) {
                return Err(ProtocolError::InvalidArgument(format!(
                    "No pending request for {:?}",
                    handle.name()
                )));
            }

            let step = match wait.check() {
                Ok(()) => self.pump_for(wait.poll_budget(poll)).await.map(|_| ()),
                Err(e) => Err(e),
            };
            if let Err(e) = step {
                self.dispatcher.unregister(handle);
                return Err(e);
            }
        }
    }

    /// Pump until any of `handles` completes. Returns the index of the first
    /// completed handle with its node; all handles are unregistered.
    pub async fn wait_any(&mut self, handles: &[RequestHandle], wait: Wait) -> Result<(usize, Node)> {
        if handles.is_empty() {
            return Err(ProtocolError::InvalidArgument("No requests to wait for".into()));
        }

        let poll = self.config.client.poll_interval;
        let outcome = loop {
            if let Some(index) = handles.iter().position(|h| self.dispatcher.is_complete(h)) {
                let result = self.dispatcher.complete(&handles[index]);
                break match result {
                    Some(result) => result.map(|node| (index, node)),
                    None => Err(ProtocolError::InvalidArgument("Request vanished".into())),
                };
            }
            if !handles.iter().any(|h| self.dispatcher.is_registered(h)) {
                break Err(ProtocolError::InvalidArgument(
                    "None of the requests is pending".into(),
                ));
            }
            if let Err(e) = wait.check() {
                break Err(e);
            }
            if let Err(e) = self.pump_for(wait.poll_budget(poll)).await {
                break Err(e);
            }
        };

        for handle in handles {
            self.dispatcher.unregister(handle);
        }
        outcome
    }

    /// One bounded poll of the socket followed by processing every complete
    /// node now buffered. Returns the number of nodes processed.
    ///
    /// # Errors
    /// `NotConnected` once the connection is closed; fatal stream errors
    /// (`StreamError`, malformed or undecryptable frames, a repeated
    /// handshake) which also close the connection
    pub async fn pump(&mut self) -> Result<usize> {
        self.pump_for(self.config.client.poll_interval).await
    }

    async fn pump_for(&mut self, budget: Duration) -> Result<usize> {
        if !self.connection.is_connected() {
            return Err(ProtocolError::NotConnected);
        }

        self.reader
            .buffer_mut()
            .reserve(self.config.transport.read_buffer_size);

        let outcome = match self
            .connection
            .read_available(self.reader.buffer_mut(), budget)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.teardown(ConnectionState::ClosedByError);
                return Err(e);
            }
        };

        let processed = match self.drain().await {
            Ok(processed) => processed,
            Err(e) => {
                warn!(error = %e, "Fatal stream error");
                self.teardown(ConnectionState::ClosedByError);
                return Err(e);
            }
        };

        if outcome == ReadOutcome::Closed {
            self.teardown(ConnectionState::ClosedByPeer);
        }
        Ok(processed)
    }

    async fn drain(&mut self) -> Result<usize> {
        let mut processed = 0;
        loop {
            match self.reader.read()? {
                Decoded::Incomplete => return Ok(processed),
                Decoded::Node(node) => {
                    self.process(node).await?;
                    processed += 1;
                }
                Decoded::EndOfStream => {
                    info!("Peer ended the stream");
                    self.teardown(ConnectionState::ClosedByPeer);
                    return Ok(processed);
                }
            }
        }
    }

    async fn process(&mut self, node: Node) -> Result<()> {
        debug!(name = node.name(), "Inbound node");

        for action in react(&node, &self.config.client.server) {
            match action {
                Action::Handshake(challenge) => self.handshake(&challenge).await?,
                Action::Send(reply) => self.send_stanza(&reply).await?,
                Action::Enqueue => self.inbox.push_back(node.clone()),
                Action::Fatal(err) => return Err(err),
            }
        }

        self.dispatcher.deliver(&node);
        Ok(())
    }

    async fn handshake(&mut self, challenge: &[u8]) -> Result<()> {
        if self.handshake_done {
            return Err(ProtocolError::HandshakeError(
                constants::ERR_HANDSHAKE_REPEATED.into(),
            ));
        }

        let hs = client_handshake(&self.credentials.account, self.credentials.secret(), challenge)?;
        self.writer.install_encrypt(hs.encrypt);
        self.reader.install_decrypt(hs.decrypt);
        self.handshake_done = true;

        self.send(&stanza::response(hs.response), false).await
    }

    fn teardown(&mut self, state: ConnectionState) {
        if self.connection.is_connected() {
            self.connection.mark_closed(state);
        }
        self.dispatcher.fail_pending(|| ProtocolError::StreamEnded);
    }

    // ------------------------------------------------------------------
    // Inbox
    // ------------------------------------------------------------------

    /// Oldest queued message or query result.
    pub fn next_message(&mut self) -> Option<Node> {
        self.inbox.pop_front()
    }

    pub fn drain_messages(&mut self) -> Vec<Node> {
        self.inbox.drain(..).collect()
    }

    pub fn pending_messages(&self) -> usize {
        self.inbox.len()
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    async fn send_message(&mut self, to: Recipient, content: Node) -> Result<String> {
        let id = self.ids.next_id();
        let envelope = stanza::message_envelope(&to, &self.config.client.server, &id, content);
        self.send_stanza(&envelope).await?;
        debug!(%id, "Message sent");
        Ok(id)
    }

    /// Plain text message. Returns the message id.
    pub async fn message(&mut self, to: impl Into<Recipient>, text: &str) -> Result<String> {
        self.send_message(to.into(), stanza::text(text)).await
    }

    pub async fn chatstate(&mut self, to: impl Into<Recipient>, state: ChatState) -> Result<String> {
        self.send_message(to.into(), stanza::chatstate(state)).await
    }

    /// Image hosted at `url`. `size` is in bytes, `thumbnail` a base64 JPEG.
    pub async fn image(
        &mut self,
        to: impl Into<Recipient>,
        url: &str,
        file: &str,
        size: u64,
        thumbnail: Option<&[u8]>,
    ) -> Result<String> {
        self.send_message(to.into(), stanza::image(url, file, size, thumbnail))
            .await
    }

    pub async fn audio(
        &mut self,
        to: impl Into<Recipient>,
        url: &str,
        file: &str,
        size: u64,
        attributes: &[(&str, &str)],
    ) -> Result<String> {
        let media = stanza::audio(url, file, size, attributes)?;
        self.send_message(to.into(), media).await
    }

    pub async fn location(
        &mut self,
        to: impl Into<Recipient>,
        latitude: f64,
        longitude: f64,
    ) -> Result<String> {
        self.send_message(to.into(), stanza::location(latitude, longitude))
            .await
    }

    pub async fn vcard(&mut self, to: impl Into<Recipient>, name: &str, data: &[u8]) -> Result<String> {
        self.send_message(to.into(), stanza::vcard(name, data)).await
    }

    /// Seconds since `number` was last online.
    ///
    /// # Errors
    /// `RequestError(condition)` when the server answers with an error iq,
    /// `Timeout` after the configured request timeout
    #[instrument(skip(self))]
    pub async fn last_seen(&mut self, number: &str) -> Result<u64> {
        let id = self.ids.next_id();
        let query =
            stanza::last_seen_query(&self.credentials.account, number, &self.config.client.server, &id);

        let handle = self.register_interest("iq", move |node| {
            if node.get("id") != Some(id.as_str()) {
                return Reply::Pending;
            }
            if node.get("type") == Some("error") {
                return Reply::Failed(ProtocolError::RequestError(condition_of(
                    node.child_named("error"),
                    constants::ERR_STREAM_ERROR_UNKNOWN,
                )));
            }
            Reply::Complete(node.clone())
        });

        if let Err(e) = self.send_stanza(&query).await {
            self.unregister(&handle);
            return Err(e);
        }

        let wait = Wait::timeout(self.config.client.request_timeout);
        let reply = self.wait_one(&handle, wait).await?;
        reply
            .child_named("query")
            .and_then(|q| q.attr_value("seconds"))
            .and_then(AttrValue::as_i64)
            .and_then(|s| u64::try_from(s).ok())
            .ok_or_else(|| ProtocolError::RequestError("last-seen reply without seconds".into()))
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("account", &self.credentials.account)
            .field("connection", &self.connection)
            .field("pending", &self.dispatcher.len())
            .field("inbox", &self.inbox.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let creds = Credentials::new("316", b"hunter2".to_vec());
        let shown = format!("{creds:?}");
        assert!(!shown.contains("hunter2"));
        assert_eq!(creds.secret(), b"hunter2");
    }

    #[test]
    fn test_condition_of() {
        let failure = Node::new("failure").child(Node::new("not-authorized"));
        assert_eq!(condition_of(Some(&failure), "x"), "not-authorized");
        assert_eq!(condition_of(Some(&Node::new("failure")), "x"), "x");
        assert_eq!(condition_of(None, "x"), "x");
    }

    #[tokio::test]
    async fn test_operations_fail_fast_before_login() {
        let mut client = Client::new(Config::default(), Credentials::new("316", b"s".to_vec())).unwrap();
        assert_eq!(client.state(), ConnectionState::Unresolved);
        assert!(matches!(client.pump().await, Err(ProtocolError::NotConnected)));
        assert!(matches!(
            client.message("317", "hi").await,
            Err(ProtocolError::NotConnected)
        ));
        assert!(client.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_any_rejects_empty_set() {
        let mut client = Client::new(Config::default(), Credentials::new("316", b"s".to_vec())).unwrap();
        assert!(matches!(
            client.wait_any(&[], Wait::forever()).await,
            Err(ProtocolError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config::default_with_overrides(|c| c.transport.ports.clear());
        assert!(matches!(
            Client::new(config, Credentials::new("316", b"s".to_vec())),
            Err(ProtocolError::ConfigError(_))
        ));
    }
}
