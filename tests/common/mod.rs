//! In-process FunXMPP server for integration tests.
//!
//! Speaks the real wire format through the crate's own Reader/Writer and the
//! server side of the handshake, so a [`Client`] under test talks to it
//! exactly as it would to a remote server.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use funxmpp::core::codec::{Decoded, Reader, Writer, STREAM_MAGIC};
use funxmpp::protocol::handshake::{generate_challenge, server_handshake, ServerHandshake};
use funxmpp::transport::StaticResolver;
use funxmpp::{Client, Config, Credentials, Node};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const ACCOUNT: &str = "31612345678";
pub const SECRET: &[u8] = b"0123456789abcdefghij";
pub const NICKNAME: &str = "tester";
pub const SERVER: &str = "s.whatsapp.net";

const IO_TIMEOUT: Duration = Duration::from_secs(5);

pub fn test_config() -> Config {
    Config::default_with_overrides(|c| {
        c.transport.host = "mock.invalid".into();
        c.transport.connect_timeout = Duration::from_secs(2);
        c.client.poll_interval = Duration::from_millis(10);
        c.client.request_timeout = Duration::from_secs(5);
    })
}

pub fn client_for(addrs: Vec<SocketAddr>, secret: &[u8]) -> Client {
    let credentials = Credentials::new(ACCOUNT, secret.to_vec()).with_nickname(NICKNAME);
    Client::with_resolver(test_config(), credentials, Arc::new(StaticResolver::new(addrs)))
        .expect("test config is valid")
}

/// Bind a server, run `script` on the first accepted session, and return a
/// client pointed at it.
pub async fn start<F, Fut, T>(script: F) -> (Client, JoinHandle<T>)
where
    F: FnOnce(ServerSession) -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let session = ServerSession::accept(&listener).await;
        script(session).await
    });
    (client_for(vec![addr], SECRET), server)
}

pub struct ServerSession {
    stream: TcpStream,
    reader: Reader,
    writer: Writer,
    encrypted: bool,
}

impl ServerSession {
    /// Accept one client and consume its magic bytes.
    pub async fn accept(listener: &TcpListener) -> Self {
        let (mut stream, _) = tokio::time::timeout(IO_TIMEOUT, listener.accept())
            .await
            .expect("client connects")
            .unwrap();
        let mut magic = [0u8; 4];
        stream.read_exact(&mut magic).await.unwrap();
        assert_eq!(magic, STREAM_MAGIC);
        Self {
            stream,
            reader: Reader::new(),
            writer: Writer::new(),
            encrypted: false,
        }
    }

    /// Next node from the client; `None` on terminator or socket close.
    pub async fn recv(&mut self) -> Option<Node> {
        loop {
            match self.reader.read().expect("client frames decode") {
                Decoded::Node(node) => return Some(node),
                Decoded::EndOfStream => return None,
                Decoded::Incomplete => {}
            }
            let read = tokio::time::timeout(IO_TIMEOUT, self.stream.read_buf(self.reader.buffer_mut()))
                .await
                .expect("client sends within timeout")
                .unwrap();
            if read == 0 {
                return None;
            }
        }
    }

    pub async fn expect(&mut self, name: &str) -> Node {
        let node = self.recv().await.unwrap_or_else(|| panic!("stream ended before {name}"));
        assert_eq!(node.name(), name, "unexpected node {node:?}");
        node
    }

    pub async fn send(&mut self, node: &Node) {
        let bytes = self.writer.node(node, self.encrypted).unwrap();
        self.stream.write_all(&bytes).await.unwrap();
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Send the terminator.
    pub async fn end(&mut self) {
        let bytes = self.writer.end_stream().unwrap();
        self.stream.write_all(&bytes).await.unwrap();
    }

    /// Preamble, features, auth, then challenge/response. Returns the `start`
    /// node. Traffic is encrypted both ways afterwards.
    pub async fn handshake(&mut self) -> Node {
        let start = self.expect("start").await;
        assert_eq!(start.get("to"), Some(SERVER));

        let features = self.expect("stream:features").await;
        assert!(features.child_named("receipt_acks").is_some());

        let auth = self.expect("auth").await;
        assert_eq!(auth.get("user"), Some(ACCOUNT));
        assert_eq!(auth.get("mechanism"), Some("WAUTH-1"));

        let challenge = generate_challenge();
        let mut hs = server_handshake(ACCOUNT, SECRET, &challenge).unwrap();
        self.send(&Node::new("challenge").with_data(challenge.to_vec())).await;

        let response = self.expect("response").await;
        hs.verify_response(response.data().unwrap_or_default())
            .expect("client proves the secret");

        self.install(hs);
        start
    }

    /// Switch both directions to the session cipher.
    pub fn install(&mut self, hs: ServerHandshake) {
        let (encrypt, decrypt) = hs.into_ciphers();
        self.writer.install_encrypt(encrypt);
        self.reader.install_decrypt(decrypt);
        self.encrypted = true;
    }

    /// Full happy-path login. Returns the client's presence.
    pub async fn accept_login(&mut self) -> Node {
        self.handshake().await;
        self.send(&success()).await;
        self.expect("presence").await
    }
}

/// The `success` node sent by [`ServerSession::accept_login`].
pub fn success() -> Node {
    Node::new("success")
        .attr("status", "active")
        .attr("kind", "free")
        .attr("creation", 1_300_000_000i64)
        .attr("expiration", 1_400_000_000i64)
}

/// Pump `client` until `server` finishes, returning the server's output.
pub async fn pump_until<T>(client: &mut Client, server: JoinHandle<T>) -> T {
    let deadline = tokio::time::Instant::now() + IO_TIMEOUT;
    while !server.is_finished() {
        assert!(tokio::time::Instant::now() < deadline, "server script timed out");
        if client.is_connected() {
            client.pump().await.unwrap();
        } else {
            tokio::task::yield_now().await;
        }
    }
    server.await.unwrap()
}
