//! Typed constructors for the stanzas the client sends.
//!
//! Every builder returns a plain [`Node`]; none of them touch the connection.

use std::fmt;
use std::str::FromStr;

use crate::core::node::Node;
use crate::error::{ProtocolError, Result};

/// SASL namespace used by `auth` and `response`
pub const NS_SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";
pub const NS_RECEIPTS: &str = "urn:xmpp:receipts";
pub const NS_LAST: &str = "jabber:iq:last";
pub const NS_EVENT: &str = "jabber:x:event";
pub const NS_MMS: &str = "urn:xmpp:whatsapp:mms";
pub const NS_CHATSTATES: &str = "http://jabber.org/protocol/chatstates";

/// Authentication mechanism announced in `auth`
pub const AUTH_MECHANISM: &str = "WAUTH-1";

/// Domain of individual accounts
pub const SERVER_DOMAIN: &str = "s.whatsapp.net";

/// Domain of group conversations
pub const GROUP_DOMAIN: &str = "g.us";

/// Attributes accepted on an audio attachment
pub const AUDIO_ATTRIBUTES: &[&str] = &[
    "abitrate",
    "acodec",
    "asampfmt",
    "asampfreq",
    "duration",
    "encoding",
    "filehash",
    "mimetype",
];

/// `user@domain`
pub fn jid(user: &str, domain: &str) -> String {
    format!("{user}@{domain}")
}

/// Conversation a message is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Contact(String),
    Group(String),
}

impl Recipient {
    pub fn contact(number: impl Into<String>) -> Self {
        Recipient::Contact(number.into())
    }

    pub fn group(id: impl Into<String>) -> Self {
        Recipient::Group(id.into())
    }

    /// Full address, using `server` for contacts.
    pub fn jid(&self, server: &str) -> String {
        match self {
            Recipient::Contact(number) => jid(number, server),
            Recipient::Group(id) => jid(id, GROUP_DOMAIN),
        }
    }
}

impl From<&str> for Recipient {
    fn from(number: &str) -> Self {
        Recipient::Contact(number.to_string())
    }
}

impl From<String> for Recipient {
    fn from(number: String) -> Self {
        Recipient::Contact(number)
    }
}

/// Typing/attention state shown to a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Active,
    Inactive,
    Composing,
    Paused,
    Gone,
}

impl ChatState {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatState::Active => "active",
            ChatState::Inactive => "inactive",
            ChatState::Composing => "composing",
            ChatState::Paused => "paused",
            ChatState::Gone => "gone",
        }
    }
}

impl fmt::Display for ChatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatState {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(ChatState::Active),
            "inactive" => Ok(ChatState::Inactive),
            "composing" => Ok(ChatState::Composing),
            "paused" => Ok(ChatState::Paused),
            "gone" => Ok(ChatState::Gone),
            other => Err(ProtocolError::InvalidArgument(format!(
                "Invalid chatstate: {other:?}"
            ))),
        }
    }
}

/// Client capabilities sent right after the preamble.
pub fn features() -> Node {
    Node::new("stream:features")
        .child(Node::new("receipt_acks"))
        .child(Node::new("w:profile:picture").attr("type", "all"))
        .child(Node::new("status"))
}

pub fn auth(user: &str) -> Node {
    Node::new("auth")
        .attr("xmlns", NS_SASL)
        .attr("mechanism", AUTH_MECHANISM)
        .attr("user", user)
}

/// Answer to a `challenge`, carrying the handshake token.
pub fn response(token: Vec<u8>) -> Node {
    Node::new("response").attr("xmlns", NS_SASL).with_data(token)
}

pub fn presence(nickname: Option<&str>) -> Node {
    Node::new("presence").attr_opt("name", nickname)
}

/// Reply to a server keep-alive ping.
pub fn pong(server: &str, id: &str) -> Node {
    Node::new("iq")
        .attr("to", server)
        .attr("id", id)
        .attr("type", "result")
}

/// Delivery acknowledgment for an inbound message.
pub fn receipt(to: &str, id: &str) -> Node {
    Node::new("message")
        .attr("to", to)
        .attr("id", id)
        .attr("type", "chat")
        .child(Node::new("received").attr("xmlns", NS_RECEIPTS))
}

pub fn last_seen_query(from: &str, number: &str, server: &str, id: &str) -> Node {
    Node::new("iq")
        .attr("type", "get")
        .attr("id", id)
        .attr("from", jid(from, server))
        .attr("to", jid(number, server))
        .child(Node::new("query").attr("xmlns", NS_LAST))
}

/// Wraps message content in the chat envelope.
pub fn message_envelope(to: &Recipient, server: &str, id: &str, content: Node) -> Node {
    Node::new("message")
        .attr("type", "chat")
        .attr("id", id)
        .attr("to", to.jid(server))
        .child(Node::new("x").attr("xmlns", NS_EVENT).child(Node::new("server")))
        .child(content)
}

pub fn text(body: &str) -> Node {
    Node::new("body").with_data(body)
}

pub fn chatstate(state: ChatState) -> Node {
    Node::new(state.as_str()).attr("xmlns", NS_CHATSTATES)
}

/// Image attachment. `size` is in bytes; `thumbnail` is a base64 JPEG.
pub fn image(url: &str, file: &str, size: u64, thumbnail: Option<&[u8]>) -> Node {
    let media = Node::new("media")
        .attr("xmlns", NS_MMS)
        .attr("type", "image")
        .attr("url", url)
        .attr("file", file)
        .attr("size", size);
    match thumbnail {
        Some(thumb) => media.with_data(thumb),
        None => media,
    }
}

/// Audio attachment.
///
/// # Errors
/// Returns `ProtocolError::InvalidArgument` for any attribute outside
/// [`AUDIO_ATTRIBUTES`]
pub fn audio(url: &str, file: &str, size: u64, attributes: &[(&str, &str)]) -> Result<Node> {
    let mut media = Node::new("media")
        .attr("xmlns", NS_MMS)
        .attr("type", "audio")
        .attr("url", url)
        .attr("file", file)
        .attr("size", size);
    for (name, value) in attributes {
        if !AUDIO_ATTRIBUTES.contains(name) {
            return Err(ProtocolError::InvalidArgument(format!(
                "Unknown audio attribute: {name:?}"
            )));
        }
        media = media.attr(*name, *value);
    }
    Ok(media)
}

pub fn location(latitude: f64, longitude: f64) -> Node {
    Node::new("media")
        .attr("xmlns", NS_MMS)
        .attr("type", "location")
        .attr("latitude", latitude.to_string())
        .attr("longitude", longitude.to_string())
}

/// Contact card attachment; `data` is the raw vCard text.
pub fn vcard(name: &str, data: &[u8]) -> Node {
    Node::new("media")
        .attr("xmlns", NS_MMS)
        .attr("type", "vcard")
        .attr("encoding", "text")
        .child(Node::new("vcard").attr("name", name).with_data(data))
}
