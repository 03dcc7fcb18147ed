//! Token dictionary.
//!
//! Frequent protocol strings travel as a single byte: the index into
//! [`DICTIONARY`]. Index `0` is reserved (empty string), index `1` is the
//! stream `start` tag and index `2` is the stream terminator.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Tag of the node opening the stream.
pub const STREAM_START: &str = "start";

/// Tag of the stream terminator list.
pub const STREAM_END: &str = "stream:end";

/// Highest byte usable as a dictionary token.
pub const MAX_TOKEN: u8 = 0xEB;

/// Single-byte token table.
pub const DICTIONARY: &[&str] = &[
    "",
    STREAM_START,
    STREAM_END,
    "stream:features",
    "stream:error",
    "auth",
    "challenge",
    "response",
    "success",
    "failure",
    "presence",
    "message",
    "iq",
    "query",
    "ping",
    "received",
    "request",
    "receipt_acks",
    "w:profile:picture",
    "status",
    "notification",
    "groups",
    "body",
    "media",
    "vcard",
    "x",
    "server",
    "error",
    "id",
    "type",
    "to",
    "from",
    "name",
    "xmlns",
    "mechanism",
    "user",
    "resource",
    "url",
    "file",
    "size",
    "encoding",
    "latitude",
    "longitude",
    "text",
    "image",
    "audio",
    "video",
    "location",
    "get",
    "set",
    "result",
    "chat",
    "all",
    "available",
    "unavailable",
    "active",
    "inactive",
    "composing",
    "paused",
    "gone",
    "seconds",
    "kind",
    "creation",
    "expiration",
    "free",
    "paid",
    "expired",
    "t",
    "code",
    "subject",
    "participant",
    "abitrate",
    "acodec",
    "asampfmt",
    "asampfreq",
    "duration",
    "filehash",
    "mimetype",
    "not-authorized",
    "conflict",
    "item-not-found",
    "system-shutdown",
    "WAUTH-1",
    "s.whatsapp.net",
    "g.us",
    "c.whatsapp.net",
    "urn:ietf:params:xml:ns:xmpp-sasl",
    "urn:ietf:params:xml:ns:xmpp-streams",
    "urn:xmpp:receipts",
    "urn:xmpp:ping",
    "urn:xmpp:whatsapp",
    "urn:xmpp:whatsapp:mms",
    "jabber:iq:last",
    "jabber:x:event",
    "http://jabber.org/protocol/chatstates",
];

fn reverse_index() -> &'static HashMap<&'static str, u8> {
    static INDEX: OnceLock<HashMap<&'static str, u8>> = OnceLock::new();
    INDEX.get_or_init(|| {
        DICTIONARY
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(i, s)| u8::try_from(i).ok().map(|t| (*s, t)))
            .collect()
    })
}

/// Token byte for a string, if it is in the dictionary.
pub fn token_of(s: &str) -> Option<u8> {
    reverse_index().get(s).copied()
}

/// String for a token byte. Returns `None` for unassigned tokens.
pub fn lookup(token: u8) -> Option<&'static str> {
    if token == 0 || token > MAX_TOKEN {
        return None;
    }
    DICTIONARY.get(usize::from(token)).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dictionary_fits_token_space() {
        assert!(DICTIONARY.len() <= usize::from(MAX_TOKEN) + 1);
    }

    #[test]
    fn test_reserved_tokens() {
        assert_eq!(lookup(1), Some(STREAM_START));
        assert_eq!(lookup(2), Some(STREAM_END));
        assert_eq!(lookup(0), None);
        assert_eq!(token_of(""), None);
    }

    #[test]
    fn test_dictionary_has_no_duplicates() {
        let mut seen = std::collections::HashSet::new();
        for s in DICTIONARY {
            assert!(seen.insert(*s), "duplicate token {s:?}");
        }
    }

    #[test]
    fn test_lookup_inverts_token_of() {
        for s in DICTIONARY.iter().skip(1) {
            let t = token_of(s).expect("token");
            assert_eq!(lookup(t), Some(*s));
        }
        assert_eq!(lookup(MAX_TOKEN), None);
    }
}
