//! # Node
//!
//! The protocol's tree-structured message unit: a name, an attribute map,
//! ordered children and an optional opaque payload.
//!
//! Nodes are built once with the builder methods and then only read.
//!
//! ```rust
//! use funxmpp::core::node::Node;
//!
//! let iq = Node::new("iq")
//!     .attr("type", "get")
//!     .attr("id", "msg-1")
//!     .child(Node::new("ping"));
//!
//! assert_eq!(iq.get("type"), Some("get"));
//! assert_eq!(iq.child_named("ping").map(Node::name), Some("ping"));
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Attribute value. Every kind travels as a byte string on the wire, so values
/// compare by their wire representation: `Int(42) == Str("42")`.
#[derive(Clone)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Bytes(Vec<u8>),
}

impl AttrValue {
    /// Wire representation of the value.
    pub fn to_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            AttrValue::Str(s) => Cow::Borrowed(s.as_bytes()),
            AttrValue::Int(i) => Cow::Owned(i.to_string().into_bytes()),
            AttrValue::Bytes(b) => Cow::Borrowed(b),
        }
    }

    /// Borrow as text. Integers are not text until formatted; use [`AttrValue::to_text`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            AttrValue::Bytes(b) => std::str::from_utf8(b).ok(),
            AttrValue::Int(_) => None,
        }
    }

    /// Text form of any value kind, lossy for non-UTF-8 bytes.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            AttrValue::Str(s) => Cow::Borrowed(s),
            AttrValue::Int(i) => Cow::Owned(i.to_string()),
            AttrValue::Bytes(b) => String::from_utf8_lossy(b),
        }
    }

    /// Integer view, parsing text values.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            other => other.as_str()?.trim().parse().ok(),
        }
    }

    /// Build from raw wire bytes: valid UTF-8 becomes `Str`, anything else `Bytes`.
    pub(crate) fn from_wire(raw: Vec<u8>) -> Self {
        match String::from_utf8(raw) {
            Ok(s) => AttrValue::Str(s),
            Err(e) => AttrValue::Bytes(e.into_bytes()),
        }
    }
}

impl PartialEq for AttrValue {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for AttrValue {}

impl fmt::Debug for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(s) => write!(f, "{s:?}"),
            AttrValue::Int(i) => write!(f, "{i}"),
            AttrValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<&String> for AttrValue {
    fn from(value: &String) -> Self {
        AttrValue::Str(value.clone())
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Int(i64::from(value))
    }
}

impl From<u32> for AttrValue {
    fn from(value: u32) -> Self {
        AttrValue::Int(i64::from(value))
    }
}

impl From<u64> for AttrValue {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(v) => AttrValue::Int(v),
            Err(_) => AttrValue::Str(value.to_string()),
        }
    }
}

impl From<Vec<u8>> for AttrValue {
    fn from(value: Vec<u8>) -> Self {
        AttrValue::Bytes(value)
    }
}

impl From<&[u8]> for AttrValue {
    fn from(value: &[u8]) -> Self {
        AttrValue::Bytes(value.to_vec())
    }
}

/// Attribute map, ordered by key so encoding is stable.
pub type Attributes = BTreeMap<String, AttrValue>;

/// Protocol tree node
#[derive(Clone, PartialEq, Eq)]
pub struct Node {
    name: String,
    attributes: Attributes,
    children: Vec<Node>,
    data: Option<Vec<u8>>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Attributes::new(),
            children: Vec::new(),
            data: None,
        }
    }

    /// Set an attribute, replacing any previous value for the key.
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set an attribute only when a value is present.
    pub fn attr_opt<V: Into<AttrValue>>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.attr(key, v),
            None => self,
        }
    }

    /// Append a child node.
    pub fn child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Append several child nodes in order.
    pub fn children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    /// Attach the payload.
    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attr_value(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    /// Text value of an attribute.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(AttrValue::as_str)
    }

    pub fn child_nodes(&self) -> &[Node] {
        &self.children
    }

    /// First child with the given name.
    pub fn child_named(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn first_child(&self) -> Option<&Node> {
        self.children.first()
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Payload as text, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        self.data().and_then(|d| std::str::from_utf8(d).ok())
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Consume the node, returning its attribute map.
    pub fn into_attributes(self) -> Attributes {
        self.attributes
    }

    pub(crate) fn from_parts(
        name: String,
        attributes: Attributes,
        children: Vec<Node>,
        data: Option<Vec<u8>>,
    ) -> Self {
        Self {
            name,
            attributes,
            children,
            data,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Node");
        s.field("name", &self.name);
        if !self.attributes.is_empty() {
            s.field("attributes", &self.attributes);
        }
        if !self.children.is_empty() {
            s.field("children", &self.children);
        }
        if let Some(data) = &self.data {
            s.field("data", &format_args!("<{} bytes>", data.len()));
        }
        s.finish()
    }
}
