//! # Request Correlation
//!
//! Registry of pending requests keyed by the name of the inbound node that may
//! answer them. Several requests can wait on the same name; each one's
//! callback decides whether a delivered node is its answer.
//!
//! Callbacks see every node with their name. A callback waiting for a
//! particular reply must filter (usually by `id`) and return
//! [`Reply::Pending`] for nodes that are not its own.

use std::collections::HashMap;
use std::fmt;

use crate::core::node::Node;
use crate::error::{ProtocolError, Result};

#[allow(unused_imports)]
use tracing::{debug, trace};

/// Verdict of a callback on a delivered node
#[derive(Debug)]
pub enum Reply {
    /// Not the awaited answer; keep waiting.
    Pending,
    /// The request completed with this result node.
    Complete(Node),
    /// The request failed.
    Failed(ProtocolError),
}

/// Callback invoked for every delivered node with the registered name
pub type Callback = Box<dyn FnMut(&Node) -> Reply + Send>;

/// Identifies one registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestHandle {
    name: String,
    id: u64,
}

impl RequestHandle {
    /// Name of the node this request waits for.
    pub fn name(&self) -> &str {
        &self.name
    }
}

struct Pending {
    id: u64,
    callback: Callback,
    result: Option<Result<Node>>,
}

/// Correlation engine: pending requests by event name.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Vec<Pending>>,
    next_id: u64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the next node(s) named `name`.
    pub fn register<F>(&mut self, name: &str, callback: F) -> RequestHandle
    where
        F: FnMut(&Node) -> Reply + Send + 'static,
    {
        self.next_id += 1;
        let id = self.next_id;
        self.handlers.entry(name.to_string()).or_default().push(Pending {
            id,
            callback: Box::new(callback),
            result: None,
        });
        trace!(name, id, "Registered request");
        RequestHandle {
            name: name.to_string(),
            id,
        }
    }

    /// Drop a registration. Unknown handles are ignored.
    pub fn unregister(&mut self, handle: &RequestHandle) {
        if let Some(pending) = self.handlers.get_mut(&handle.name) {
            pending.retain(|p| p.id != handle.id);
            if pending.is_empty() {
                self.handlers.remove(&handle.name);
            }
        }
    }

    /// Offer `node` to every incomplete request registered under its name.
    /// Returns how many requests completed or failed.
    pub fn deliver(&mut self, node: &Node) -> usize {
        let Some(pending) = self.handlers.get_mut(node.name()) else {
            return 0;
        };

        // Requests registered before this delivery, still waiting
        let targets: Vec<u64> = pending
            .iter()
            .filter(|p| p.result.is_none())
            .map(|p| p.id)
            .collect();

        let mut finished = 0;
        for id in targets {
            let Some(entry) = pending.iter_mut().find(|p| p.id == id) else {
                continue;
            };
            if entry.result.is_some() {
                continue;
            }
            match (entry.callback)(node) {
                Reply::Pending => {}
                Reply::Complete(result) => {
                    entry.result = Some(Ok(result));
                    finished += 1;
                }
                Reply::Failed(err) => {
                    debug!(name = node.name(), error = %err, "Request failed");
                    entry.result = Some(Err(err));
                    finished += 1;
                }
            }
        }
        finished
    }

    /// Fail every incomplete request, e.g. when the stream ends.
    pub fn fail_pending<F>(&mut self, mut err: F)
    where
        F: FnMut() -> ProtocolError,
    {
        for entry in self.handlers.values_mut().flatten() {
            if entry.result.is_none() {
                entry.result = Some(Err(err()));
            }
        }
    }

    pub fn is_registered(&self, handle: &RequestHandle) -> bool {
        self.handlers
            .get(&handle.name)
            .is_some_and(|pending| pending.iter().any(|p| p.id == handle.id))
    }

    pub fn is_complete(&self, handle: &RequestHandle) -> bool {
        self.handlers
            .get(&handle.name)
            .and_then(|pending| pending.iter().find(|p| p.id == handle.id))
            .is_some_and(|p| p.result.is_some())
    }

    /// Remove a finished request and return its result. `None` while the
    /// request is still pending (or unknown).
    pub fn complete(&mut self, handle: &RequestHandle) -> Option<Result<Node>> {
        if !self.is_complete(handle) {
            return None;
        }
        let pending = self.handlers.get_mut(&handle.name)?;
        let pos = pending.iter().position(|p| p.id == handle.id)?;
        let entry = pending.remove(pos);
        if pending.is_empty() {
            self.handlers.remove(&handle.name);
        }
        entry.result
    }

    /// Number of registered requests, complete or not.
    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<(&str, usize)> = self
            .handlers
            .iter()
            .map(|(name, pending)| (name.as_str(), pending.len()))
            .collect();
        f.debug_struct("Dispatcher").field("pending", &names).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn by_id(id: &'static str) -> impl FnMut(&Node) -> Reply + Send {
        move |node: &Node| {
            if node.get("id") == Some(id) {
                Reply::Complete(node.clone())
            } else {
                Reply::Pending
            }
        }
    }

    #[test]
    fn test_self_filtering_isolation() {
        let mut d = Dispatcher::new();
        let a = d.register("iq", by_id("a"));
        let b = d.register("iq", by_id("b"));

        assert_eq!(d.deliver(&Node::new("iq").attr("id", "b")), 1);
        assert!(!d.is_complete(&a));
        assert!(d.is_complete(&b));
        assert!(d.complete(&a).is_none());

        let got = d.complete(&b).unwrap().unwrap();
        assert_eq!(got.get("id"), Some("b"));
        assert!(!d.is_registered(&b));
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn test_completed_request_not_redelivered() {
        let mut d = Dispatcher::new();
        let mut calls = 0;
        let h = d.register("success", move |n: &Node| {
            calls += 1;
            assert_eq!(calls, 1, "callback invoked after completion");
            Reply::Complete(n.clone())
        });

        assert_eq!(d.deliver(&Node::new("success")), 1);
        assert_eq!(d.deliver(&Node::new("success")), 0);
        assert!(d.complete(&h).unwrap().is_ok());
    }

    #[test]
    fn test_failed_reply_surfaces_error() {
        let mut d = Dispatcher::new();
        let h = d.register("failure", |_: &Node| {
            Reply::Failed(ProtocolError::RequestError("not-authorized".into()))
        });
        d.deliver(&Node::new("failure"));
        match d.complete(&h) {
            Some(Err(ProtocolError::RequestError(c))) => assert_eq!(c, "not-authorized"),
            other => panic!("Unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_fail_pending_skips_completed() {
        let mut d = Dispatcher::new();
        let done = d.register("success", |n: &Node| Reply::Complete(n.clone()));
        let waiting = d.register("iq", by_id("x"));
        d.deliver(&Node::new("success"));

        d.fail_pending(|| ProtocolError::StreamEnded);
        assert!(d.complete(&done).unwrap().is_ok());
        assert!(matches!(d.complete(&waiting), Some(Err(ProtocolError::StreamEnded))));
        assert!(d.is_empty());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let mut d = Dispatcher::new();
        let h = d.register("iq", by_id("a"));
        d.unregister(&h);
        d.unregister(&h);
        assert!(d.is_empty());
        assert_eq!(d.deliver(&Node::new("iq").attr("id", "a")), 0);
    }

    #[test]
    fn test_unrelated_names_untouched() {
        let mut d = Dispatcher::new();
        let h = d.register("success", |n: &Node| Reply::Complete(n.clone()));
        assert_eq!(d.deliver(&Node::new("failure")), 0);
        assert!(!d.is_complete(&h));
    }
}
