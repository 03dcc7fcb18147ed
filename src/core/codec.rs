//! Node codec: tree encoding inside frames, incremental Reader and Writer.
//!
//! ## Tree encoding
//! ```text
//! node    := list(1 + 2*attrs [+1]) tag (key value)* [content]
//! list(n) := 0x00 | 0xF8 n:u8 | 0xF9 n:u16
//! content := list(children) node* | string
//! string  := token(0x01..=0xEB) | 0xFA string string (jid)
//!          | 0xFC n:u8 bytes | 0xFD n:u24 bytes | 0x00 (empty)
//! ```

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

use crate::core::frame::{Frame, FrameCodec, MAX_FRAME_SIZE};
use crate::core::node::{AttrValue, Attributes, Node};
use crate::core::token::{self, STREAM_END, STREAM_START};
use crate::error::{constants, ProtocolError, Result};
use crate::utils::crypto::{FrameCipher, TAG_LEN};

/// Bytes opening every client stream, ahead of the `start` frame.
pub const STREAM_MAGIC: [u8; 4] = [b'W', b'A', 0x01, 0x02];

/// Maximum node nesting accepted by the decoder
pub const MAX_DEPTH: usize = 64;

const LIST_EMPTY: u8 = 0x00;
const LIST_8: u8 = 0xF8;
const LIST_16: u8 = 0xF9;
const JID_PAIR: u8 = 0xFA;
const BINARY_8: u8 = 0xFC;
const BINARY_24: u8 = 0xFD;

const MAX_BINARY: usize = 0xFF_FFFF;

// ============================================================================
// Encoding
// ============================================================================

fn write_list_size(out: &mut Vec<u8>, size: usize) -> Result<()> {
    match size {
        0 => out.push(LIST_EMPTY),
        1..=0xFF => {
            out.push(LIST_8);
            out.push(size as u8);
        }
        0x100..=0xFFFF => {
            out.push(LIST_16);
            out.extend_from_slice(&(size as u16).to_be_bytes());
        }
        _ => {
            return Err(ProtocolError::MalformedFrame(
                constants::ERR_LIST_TOO_LARGE.into(),
            ))
        }
    }
    Ok(())
}

fn write_binary(out: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    let len = bytes.len();
    if len <= 0xFF {
        out.push(BINARY_8);
        out.push(len as u8);
    } else if len <= MAX_BINARY {
        out.push(BINARY_24);
        out.extend_from_slice(&(len as u32).to_be_bytes()[1..]);
    } else {
        return Err(ProtocolError::OversizedFrame(len));
    }
    out.extend_from_slice(bytes);
    Ok(())
}

fn write_string(out: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    if let Ok(s) = std::str::from_utf8(bytes) {
        if let Some(t) = token::token_of(s) {
            out.push(t);
            return Ok(());
        }
        if let Some((user, server)) = s.split_once('@') {
            if !user.is_empty() && !server.contains('@') && token::token_of(server).is_some() {
                out.push(JID_PAIR);
                write_string(out, user.as_bytes())?;
                return write_string(out, server.as_bytes());
            }
        }
    }
    write_binary(out, bytes)
}

fn write_node(out: &mut Vec<u8>, node: &Node) -> Result<()> {
    if node.name().is_empty() {
        return Err(ProtocolError::MalformedFrame(constants::ERR_EMPTY_NAME.into()));
    }
    if node.has_children() && node.data().is_some() {
        return Err(ProtocolError::MalformedFrame(
            constants::ERR_CHILDREN_AND_PAYLOAD.into(),
        ));
    }

    let has_content = node.has_children() || node.data().is_some();
    write_list_size(out, 1 + 2 * node.attributes().len() + usize::from(has_content))?;
    write_string(out, node.name().as_bytes())?;

    for (key, value) in node.attributes() {
        write_string(out, key.as_bytes())?;
        write_string(out, &value.to_bytes())?;
    }

    if node.has_children() {
        write_list_size(out, node.child_nodes().len())?;
        for child in node.child_nodes() {
            write_node(out, child)?;
        }
    } else if let Some(data) = node.data() {
        write_binary(out, data)?;
    }
    Ok(())
}

/// Encode a node tree into a frame body. The terminator tag is reserved at
/// the top level; use [`Writer::end_stream`] to end a stream.
pub fn encode_tree(node: &Node) -> Result<Vec<u8>> {
    if node.name() == STREAM_END {
        return Err(ProtocolError::InvalidArgument(
            constants::ERR_RESERVED_NAME.into(),
        ));
    }
    let mut out = Vec::with_capacity(64);
    write_node(&mut out, node)?;
    Ok(out)
}

// ============================================================================
// Decoding
// ============================================================================

/// Result of decoding a frame body
#[derive(Debug)]
enum Tree {
    Node(Node),
    End,
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn truncated() -> ProtocolError {
        ProtocolError::MalformedFrame(constants::ERR_TRUNCATED.into())
    }

    fn u8(&mut self) -> Result<u8> {
        let b = *self.buf.get(self.pos).ok_or_else(Self::truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or_else(Self::truncated)?;
        let slice = self.buf.get(self.pos..end).ok_or_else(Self::truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<usize> {
        let b = self.take(2)?;
        Ok(usize::from(b[0]) << 8 | usize::from(b[1]))
    }

    fn u24(&mut self) -> Result<usize> {
        let b = self.take(3)?;
        Ok(usize::from(b[0]) << 16 | usize::from(b[1]) << 8 | usize::from(b[2]))
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn list_size(&mut self, tag: u8) -> Result<usize> {
        match tag {
            LIST_EMPTY => Ok(0),
            LIST_8 => Ok(usize::from(self.u8()?)),
            LIST_16 => self.u16(),
            other => Err(ProtocolError::MalformedFrame(format!(
                "expected list, found 0x{other:02X}"
            ))),
        }
    }

    fn string(&mut self, tag: u8) -> Result<Vec<u8>> {
        match tag {
            LIST_EMPTY => Ok(Vec::new()),
            BINARY_8 => {
                let n = usize::from(self.u8()?);
                Ok(self.take(n)?.to_vec())
            }
            BINARY_24 => {
                let n = self.u24()?;
                Ok(self.take(n)?.to_vec())
            }
            JID_PAIR => {
                let user_tag = self.u8()?;
                if user_tag == JID_PAIR {
                    return Err(ProtocolError::MalformedFrame("nested jid".into()));
                }
                let user = self.string(user_tag)?;
                let server_tag = self.u8()?;
                if server_tag == JID_PAIR {
                    return Err(ProtocolError::MalformedFrame("nested jid".into()));
                }
                let server = self.string(server_tag)?;
                if user.is_empty() {
                    return Ok(server);
                }
                let mut jid = user;
                jid.push(b'@');
                jid.extend_from_slice(&server);
                Ok(jid)
            }
            t => token::lookup(t)
                .map(|s| s.as_bytes().to_vec())
                .ok_or_else(|| ProtocolError::MalformedFrame(format!("unknown token 0x{t:02X}"))),
        }
    }

    fn text(&mut self, tag: u8) -> Result<String> {
        String::from_utf8(self.string(tag)?)
            .map_err(|_| ProtocolError::MalformedFrame("non UTF-8 identifier".into()))
    }

    fn node(&mut self, depth: usize) -> Result<Node> {
        if depth > MAX_DEPTH {
            return Err(ProtocolError::MalformedFrame(constants::ERR_TOO_DEEP.into()));
        }

        let list_tag = self.u8()?;
        let size = self.list_size(list_tag)?;
        if size == 0 {
            return Err(ProtocolError::MalformedFrame(constants::ERR_EMPTY_NODE.into()));
        }

        let tag = self.u8()?;
        let name = self.text(tag)?;
        if name.is_empty() {
            return Err(ProtocolError::MalformedFrame(constants::ERR_EMPTY_NAME.into()));
        }

        let mut attributes = Attributes::new();
        for _ in 0..(size - 1) / 2 {
            let key_tag = self.u8()?;
            let key = self.text(key_tag)?;
            let value_tag = self.u8()?;
            let value = self.string(value_tag)?;
            attributes.insert(key, AttrValue::from_wire(value));
        }

        let mut children = Vec::new();
        let mut data = None;
        if size % 2 == 0 {
            let content_tag = self.u8()?;
            match content_tag {
                LIST_EMPTY | LIST_8 | LIST_16 => {
                    let count = self.list_size(content_tag)?;
                    children.reserve(count.min(256));
                    for _ in 0..count {
                        children.push(self.node(depth + 1)?);
                    }
                }
                other => data = Some(self.string(other)?),
            }
        }

        Ok(Node::from_parts(name, attributes, children, data))
    }
}

fn decode_tree(body: &[u8]) -> Result<Tree> {
    let mut cursor = Cursor::new(body);
    let node = cursor.node(0)?;
    if !cursor.is_empty() {
        return Err(ProtocolError::MalformedFrame(
            constants::ERR_TRAILING_BYTES.into(),
        ));
    }

    let is_terminator = node.name() == STREAM_END
        && node.attributes().is_empty()
        && !node.has_children()
        && node.data().is_none();
    if is_terminator {
        return Ok(Tree::End);
    }
    Ok(Tree::Node(node))
}

/// Decode a single (cleartext) frame body into a node.
pub fn decode_node(body: &[u8]) -> Result<Node> {
    match decode_tree(body)? {
        Tree::Node(node) => Ok(node),
        Tree::End => Err(ProtocolError::StreamEnded),
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Outcome of one [`Reader::read`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// One complete node was consumed from the buffer.
    Node(Node),
    /// Not enough bytes buffered yet; nothing was consumed.
    Incomplete,
    /// The peer sent the stream terminator.
    EndOfStream,
}

/// Incremental node decoder over a growable buffer.
#[derive(Debug, Default)]
pub struct Reader {
    buffer: BytesMut,
    decrypt: Option<FrameCipher>,
    ended: bool,
}

impl Reader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes received from the transport.
    pub fn data(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Direct access for transports reading straight into the buffer.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Bytes waiting to be decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Install the post-handshake decrypt transform.
    pub fn install_decrypt(&mut self, cipher: FrameCipher) {
        self.decrypt = Some(cipher);
    }

    pub fn has_decrypt(&self) -> bool {
        self.decrypt.is_some()
    }

    /// Decode one node from the front of the buffer.
    ///
    /// # Errors
    /// Malformed frames, undecryptable bodies and encrypted frames arriving
    /// before a decrypt transform is installed are fatal to the stream.
    pub fn read(&mut self) -> Result<Decoded> {
        if self.ended {
            return Ok(Decoded::EndOfStream);
        }

        let Some(frame) = FrameCodec.decode(&mut self.buffer)? else {
            return Ok(Decoded::Incomplete);
        };

        let body = match (frame.encrypted, self.decrypt.as_mut()) {
            (true, Some(cipher)) => cipher.decrypt(&frame.body)?,
            (true, None) => return Err(ProtocolError::CipherNotInstalled),
            (false, Some(_)) => {
                return Err(ProtocolError::MalformedFrame(
                    constants::ERR_PLAIN_AFTER_CIPHER.into(),
                ))
            }
            (false, None) => frame.body,
        };

        match decode_tree(&body)? {
            Tree::Node(node) => {
                trace!(name = node.name(), bytes = body.len(), "Decoded node");
                Ok(Decoded::Node(node))
            }
            Tree::End => {
                debug!("Decoded stream terminator");
                self.ended = true;
                Ok(Decoded::EndOfStream)
            }
        }
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Node encoder producing framed bytes.
#[derive(Debug, Default)]
pub struct Writer {
    encrypt: Option<FrameCipher>,
    stream_started: bool,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the post-handshake encrypt transform.
    pub fn install_encrypt(&mut self, cipher: FrameCipher) {
        self.encrypt = Some(cipher);
    }

    pub fn has_encrypt(&self) -> bool {
        self.encrypt.is_some()
    }

    fn frame(&mut self, body: Vec<u8>, encrypt: bool) -> Result<Bytes> {
        // Size check first: a rejected frame must not consume a nonce
        let wire_len = body.len() + if encrypt { TAG_LEN } else { 0 };
        if wire_len > MAX_FRAME_SIZE {
            return Err(ProtocolError::OversizedFrame(wire_len));
        }

        let frame = if encrypt {
            let cipher = self
                .encrypt
                .as_mut()
                .ok_or(ProtocolError::CipherNotInstalled)?;
            Frame::encrypted(cipher.encrypt(&body)?)
        } else {
            Frame::plain(body)
        };

        let mut buf = BytesMut::new();
        FrameCodec.encode(frame, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Serialize a node into one frame, encrypting the body when asked.
    pub fn node(&mut self, node: &Node, encrypt: bool) -> Result<Bytes> {
        let body = encode_tree(node)?;
        trace!(name = node.name(), bytes = body.len(), encrypt, "Encoded node");
        self.frame(body, encrypt)
    }

    /// Stream preamble: magic bytes followed by the cleartext `start` frame.
    /// May only be produced once per Writer.
    pub fn start_stream(&mut self, host: &str, client_version: &str) -> Result<Bytes> {
        if self.stream_started {
            return Err(ProtocolError::MalformedFrame(
                constants::ERR_STREAM_STARTED.into(),
            ));
        }

        let start = Node::new(STREAM_START)
            .attr("to", host)
            .attr("resource", client_version);
        let frame = self.node(&start, false)?;

        let mut out = BytesMut::with_capacity(STREAM_MAGIC.len() + frame.len());
        out.extend_from_slice(&STREAM_MAGIC);
        out.extend_from_slice(&frame);
        self.stream_started = true;
        Ok(out.freeze())
    }

    /// Stream terminator frame, encrypted once the session cipher is installed.
    pub fn end_stream(&mut self) -> Result<Bytes> {
        let mut body = Vec::with_capacity(3);
        write_list_size(&mut body, 1)?;
        write_string(&mut body, STREAM_END.as_bytes())?;
        let encrypt = self.has_encrypt();
        self.frame(body, encrypt)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn sample() -> Node {
        Node::new("message")
            .attr("to", "31612345678@s.whatsapp.net")
            .attr("id", "msg-1")
            .attr("type", "chat")
            .child(Node::new("x").attr("xmlns", "jabber:x:event").child(Node::new("server")))
            .child(Node::new("body").with_data("hello"))
    }

    #[test]
    fn test_tree_roundtrip() {
        let node = sample();
        assert_eq!(decode_node(&encode_tree(&node).unwrap()).unwrap(), node);
    }

    #[test]
    fn test_jid_pair_encoding() {
        let body = encode_tree(&Node::new("iq").attr("to", "123@s.whatsapp.net")).unwrap();
        assert!(body.contains(&JID_PAIR));

        // Unknown server part falls back to raw bytes
        let body = encode_tree(&Node::new("iq").attr("to", "123@example.org")).unwrap();
        assert!(!body.contains(&JID_PAIR));
    }

    #[test]
    fn test_children_and_payload_rejected() {
        let node = Node::new("media").child(Node::new("vcard")).with_data("x");
        assert!(matches!(encode_tree(&node), Err(ProtocolError::MalformedFrame(_))));
    }

    #[test]
    fn test_empty_payload_distinct_from_none() {
        let with_empty = Node::new("body").with_data(Vec::new());
        let decoded = decode_node(&encode_tree(&with_empty).unwrap()).unwrap();
        assert_eq!(decoded.data(), Some(&[][..]));
        assert_eq!(decode_node(&encode_tree(&Node::new("body")).unwrap()).unwrap().data(), None);
    }

    #[test]
    fn test_large_payload_uses_binary24() {
        let node = Node::new("media").with_data(vec![7u8; 70_000]);
        let body = encode_tree(&node).unwrap();
        assert!(body.contains(&BINARY_24));
        assert_eq!(decode_node(&body).unwrap(), node);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut body = encode_tree(&Node::new("ping")).unwrap();
        body.push(0x00);
        assert!(matches!(decode_node(&body), Err(ProtocolError::MalformedFrame(_))));
    }

    #[test]
    fn test_depth_limit() {
        let mut node = Node::new("x");
        for _ in 0..(MAX_DEPTH + 1) {
            node = Node::new("x").child(node);
        }
        let body = encode_tree(&node).unwrap();
        assert!(matches!(decode_node(&body), Err(ProtocolError::MalformedFrame(_))));
    }

    #[test]
    fn test_reader_drains_queued_frames() {
        let mut writer = Writer::new();
        let mut reader = Reader::new();
        reader.data(&writer.node(&Node::new("ping"), false).unwrap());
        reader.data(&writer.node(&sample(), false).unwrap());

        assert_eq!(reader.read().unwrap(), Decoded::Node(Node::new("ping")));
        assert_eq!(reader.read().unwrap(), Decoded::Node(sample()));
        assert_eq!(reader.read().unwrap(), Decoded::Incomplete);
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn test_reader_end_of_stream_is_sticky() {
        let mut writer = Writer::new();
        let mut reader = Reader::new();
        reader.data(&writer.end_stream().unwrap());
        reader.data(&writer.node(&Node::new("ping"), false).unwrap());

        assert_eq!(reader.read().unwrap(), Decoded::EndOfStream);
        assert_eq!(reader.read().unwrap(), Decoded::EndOfStream);
    }

    #[test]
    fn test_start_stream_once() {
        let mut writer = Writer::new();
        let preamble = writer.start_stream("s.whatsapp.net", "Android-2.8.5732").unwrap();
        assert_eq!(&preamble[..4], &STREAM_MAGIC);

        let mut reader = Reader::new();
        reader.data(&preamble[4..]);
        match reader.read().unwrap() {
            Decoded::Node(start) => {
                assert_eq!(start.name(), STREAM_START);
                assert_eq!(start.get("to"), Some("s.whatsapp.net"));
                assert_eq!(start.get("resource"), Some("Android-2.8.5732"));
            }
            other => panic!("Unexpected: {other:?}"),
        }

        assert!(writer.start_stream("s.whatsapp.net", "x").is_err());
    }

    #[test]
    fn test_encrypt_without_cipher_fails() {
        let mut writer = Writer::new();
        assert!(matches!(
            writer.node(&Node::new("ping"), true),
            Err(ProtocolError::CipherNotInstalled)
        ));
    }

    fn paired() -> (Writer, Reader) {
        let mut writer = Writer::new();
        let mut reader = Reader::new();
        writer.install_encrypt(FrameCipher::new(&mut [9u8; 32]));
        reader.install_decrypt(FrameCipher::new(&mut [9u8; 32]));
        (writer, reader)
    }

    #[test]
    fn test_oversized_encrypted_frame_keeps_cipher_in_step() {
        let (mut writer, mut reader) = paired();

        let big = Node::new("body").with_data(vec![0u8; 1_100_000]);
        assert!(matches!(
            writer.node(&big, true),
            Err(ProtocolError::OversizedFrame(n)) if n > MAX_FRAME_SIZE
        ));

        reader.data(&writer.node(&Node::new("presence"), true).unwrap());
        assert_eq!(reader.read().unwrap(), Decoded::Node(Node::new("presence")));
    }

    #[test]
    fn test_tag_counts_toward_frame_limit() {
        let (mut writer, _) = paired();
        let node = Node::new("body").with_data(vec![0u8; MAX_FRAME_SIZE - 10]);
        let body_len = encode_tree(&node).unwrap().len();
        assert!(body_len <= MAX_FRAME_SIZE && body_len + TAG_LEN > MAX_FRAME_SIZE);

        assert!(writer.node(&node, false).is_ok());
        assert!(matches!(
            writer.node(&node, true),
            Err(ProtocolError::OversizedFrame(n)) if n == body_len + TAG_LEN
        ));
    }

    #[test]
    fn test_plain_frame_rejected_after_cipher_installed() {
        let (_, mut reader) = paired();
        let forged = Node::new("success").attr("kind", "paid");
        reader.data(&Frame::plain(encode_tree(&forged).unwrap()).to_bytes().unwrap());
        assert!(matches!(reader.read(), Err(ProtocolError::MalformedFrame(_))));
    }

    #[test]
    fn test_terminator_encrypted_after_cipher_installed() {
        let (mut writer, mut reader) = paired();
        let bytes = writer.end_stream().unwrap();
        assert_eq!(bytes[0] >> 4, crate::core::frame::FLAG_ENCRYPTED);
        reader.data(&bytes);
        assert_eq!(reader.read().unwrap(), Decoded::EndOfStream);
    }

    #[test]
    fn test_terminator_name_reserved() {
        assert!(matches!(
            encode_tree(&Node::new(STREAM_END)),
            Err(ProtocolError::InvalidArgument(_))
        ));
        // Only the top level is reserved
        let nested = Node::new("x").child(Node::new(STREAM_END));
        assert_eq!(decode_node(&encode_tree(&nested).unwrap()).unwrap(), nested);
    }
}
