//! # Built-in Reactions
//!
//! Inbound nodes the client answers on its own, before any registered waiter
//! sees them. [`react`] is pure: it inspects one node and returns the actions
//! the session must carry out, in order.
//!
//! | Inbound                               | Actions                          |
//! |---------------------------------------|----------------------------------|
//! | `challenge`                           | `Handshake(payload)`             |
//! | `message`                             | `Enqueue`, `Send(receipt)` if requested |
//! | `iq type=get`, first child `ping`     | `Send(pong)`                     |
//! | `iq type=result`, first child `query` | `Enqueue`                        |
//! | `stream:error`                        | `Fatal(StreamError(condition))`  |
//!
//! Anything else yields no action and is only offered to waiters.

use crate::core::node::Node;
use crate::error::{constants, ProtocolError};
use crate::protocol::stanza;

#[allow(unused_imports)]
use tracing::{debug, trace};

/// Work the session performs in response to an inbound node.
#[derive(Debug)]
pub enum Action {
    /// Run the cipher handshake over the challenge bytes.
    Handshake(Vec<u8>),
    /// Write this node to the peer.
    Send(Node),
    /// Append the inbound node to the inbox.
    Enqueue,
    /// Tear the session down with this error.
    Fatal(ProtocolError),
}

/// Decide the built-in reaction to `node`. `server` is the domain pongs are
/// addressed to.
pub fn react(node: &Node, server: &str) -> Vec<Action> {
    match node.name() {
        "challenge" => {
            let challenge = node.data().unwrap_or_default().to_vec();
            vec![Action::Handshake(challenge)]
        }
        "message" => {
            let mut actions = vec![Action::Enqueue];
            if let Some(receipt) = receipt_for(node) {
                actions.push(Action::Send(receipt));
            }
            actions
        }
        "iq" => iq(node, server),
        "stream:error" => {
            let condition = node
                .first_child()
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| constants::ERR_STREAM_ERROR_UNKNOWN.to_string());
            vec![Action::Fatal(ProtocolError::StreamError(condition))]
        }
        _ => Vec::new(),
    }
}

fn receipt_for(message: &Node) -> Option<Node> {
    let request = message.child_named("request")?;
    if request.get("xmlns") != Some(stanza::NS_RECEIPTS) {
        return None;
    }
    let (Some(from), Some(id)) = (message.get("from"), message.get("id")) else {
        debug!("Receipt requested without from/id, not acknowledging");
        return None;
    };
    Some(stanza::receipt(from, id))
}

fn iq(node: &Node, server: &str) -> Vec<Action> {
    let Some(first) = node.first_child() else {
        trace!("Childless iq");
        return Vec::new();
    };

    match (node.get("type"), first.name()) {
        (Some("get"), "ping") => match node.get("id") {
            Some(id) => vec![Action::Send(stanza::pong(server, id))],
            None => Vec::new(),
        },
        (Some("result"), "query") => vec![Action::Enqueue],
        _ => {
            trace!(kind = ?node.get("type"), child = first.name(), "Unhandled iq");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER: &str = "s.whatsapp.net";

    #[test]
    fn test_challenge_triggers_handshake() {
        let actions = react(&Node::new("challenge").with_data(vec![1, 2, 3]), SERVER);
        assert!(matches!(&actions[..], [Action::Handshake(c)] if c == &[1, 2, 3]));
    }

    #[test]
    fn test_message_with_receipt_request() {
        let msg = Node::new("message")
            .attr("from", "316@s.whatsapp.net")
            .attr("id", "abc")
            .child(Node::new("request").attr("xmlns", stanza::NS_RECEIPTS))
            .child(Node::new("body").with_data("hi"));

        let actions = react(&msg, SERVER);
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], Action::Enqueue));
        match &actions[1] {
            Action::Send(receipt) => {
                assert_eq!(receipt, &stanza::receipt("316@s.whatsapp.net", "abc"));
            }
            other => panic!("Unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_message_without_receipt_namespace() {
        let msg = Node::new("message")
            .attr("from", "316@s.whatsapp.net")
            .attr("id", "abc")
            .child(Node::new("request").attr("xmlns", "other"));
        assert!(matches!(&react(&msg, SERVER)[..], [Action::Enqueue]));
    }

    #[test]
    fn test_ping_gets_pong() {
        let ping = Node::new("iq")
            .attr("type", "get")
            .attr("id", "p1")
            .child(Node::new("ping"));
        match &react(&ping, SERVER)[..] {
            [Action::Send(pong)] => {
                assert_eq!(pong.get("type"), Some("result"));
                assert_eq!(pong.get("id"), Some("p1"));
                assert_eq!(pong.get("to"), Some(SERVER));
            }
            other => panic!("Unexpected actions: {other:?}"),
        }
    }

    #[test]
    fn test_query_result_enqueued() {
        let iq = Node::new("iq")
            .attr("type", "result")
            .child(Node::new("query").attr("seconds", 5));
        assert!(matches!(&react(&iq, SERVER)[..], [Action::Enqueue]));
    }

    #[test]
    fn test_stream_error_condition() {
        let err = Node::new("stream:error").child(Node::new("conflict"));
        match &react(&err, SERVER)[..] {
            [Action::Fatal(ProtocolError::StreamError(c))] => assert_eq!(c, "conflict"),
            other => panic!("Unexpected actions: {other:?}"),
        }

        match &react(&Node::new("stream:error"), SERVER)[..] {
            [Action::Fatal(ProtocolError::StreamError(c))] => {
                assert_eq!(c, constants::ERR_STREAM_ERROR_UNKNOWN)
            }
            other => panic!("Unexpected actions: {other:?}"),
        }
    }

    #[test]
    fn test_unrelated_nodes_ignored() {
        assert!(react(&Node::new("success"), SERVER).is_empty());
        assert!(react(&Node::new("iq").attr("type", "get"), SERVER).is_empty());
    }
}
