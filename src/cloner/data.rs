//! Application data graph accepted by the cloner
//!
//! `Data` mirrors what an application may hand over as log "extra" data:
//! primitives, functions (not representable in JSON), and shared, mutable,
//! identity-bearing nodes (arrays, plain objects, errors). Nodes live behind
//! `Handle`s, so a graph may reference the same node several times or even
//! contain cycles.

use parking_lot::Mutex;
use serde_json::{Number, Value};
use std::fmt;
use std::sync::Arc;

/// Conversion hook: an object providing its own JSON form
pub type ToJson = Arc<dyn Fn() -> Data + Send + Sync>;

/// A value in an application data graph
#[derive(Clone, Default)]
pub enum Data {
    /// Missing value, never serialized
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    /// Callable value, never serialized
    Function,
    /// Shared node with identity
    Object(Handle),
}

/// One own property of an object or error node
#[derive(Clone)]
pub struct Property {
    pub key: String,
    pub value: Data,
    pub enumerable: bool,
}

/// Plain object node
#[derive(Clone, Default)]
pub struct ObjectNode {
    pub properties: Vec<Property>,
    pub to_json: Option<ToJson>,
}

/// Error node: a name (not an own property) plus own properties,
/// `message` and `stack` included
#[derive(Clone)]
pub struct ErrorNode {
    pub name: String,
    pub properties: Vec<Property>,
}

/// Node payload behind a handle
#[derive(Clone)]
pub enum Node {
    Array(Vec<Data>),
    Object(ObjectNode),
    Error(ErrorNode),
}

/// Shared reference to a node; equality is identity
///
/// Handles are reference counted, so a graph containing a cycle (an object
/// holding a handle to itself or to an ancestor) is never freed on its own.
/// Call `clear` on one node of the cycle once the graph is no longer needed.
#[derive(Clone)]
pub struct Handle(Arc<Mutex<Node>>);

impl Handle {
    fn wrap(node: Node) -> Self {
        Self(Arc::new(Mutex::new(node)))
    }

    /// New empty plain object
    pub fn object() -> Self {
        Self::wrap(Node::Object(ObjectNode::default()))
    }

    /// New empty array
    pub fn array() -> Self {
        Self::wrap(Node::Array(Vec::new()))
    }

    /// New error with a name and a (non-enumerable) message
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::wrap(Node::Error(ErrorNode {
            name: name.into(),
            properties: vec![Property {
                key: "message".to_string(),
                value: Data::String(message.into()),
                enumerable: false,
            }],
        }))
    }

    /// Capture a Rust error and its `source()` chain.
    ///
    /// Each source becomes a nested error under the `cause` property.
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let handle = Self::error("Error", error.to_string());
        if let Some(source) = error.source() {
            handle.set("cause", Self::from_error(source));
        }
        handle
    }

    /// Attach a stack trace (text whose first line is the message line)
    pub fn with_stack(self, stack: impl Into<String>) -> Self {
        self.define("stack", Data::String(stack.into()), false);
        self
    }

    /// Pointer identity of the node
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Whether both handles point at the same node
    pub fn same(&self, other: &Handle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Shallow copy of the node (children stay shared)
    pub fn snapshot(&self) -> Node {
        self.0.lock().clone()
    }

    /// Set an enumerable property (objects and errors), replacing any previous value
    pub fn set(&self, key: impl Into<String>, value: impl Into<Data>) {
        self.define(key, value, true);
    }

    /// Set a property with an explicit enumerable flag
    pub fn define(&self, key: impl Into<String>, value: impl Into<Data>, enumerable: bool) {
        let key = key.into();
        let value = value.into();
        let mut node = self.0.lock();
        let properties = match &mut *node {
            Node::Object(object) => &mut object.properties,
            Node::Error(error) => &mut error.properties,
            Node::Array(_) => return,
        };
        match properties.iter_mut().find(|p| p.key == key) {
            Some(existing) => {
                existing.value = value;
                existing.enumerable = enumerable;
            }
            None => properties.push(Property {
                key,
                value,
                enumerable,
            }),
        }
    }

    /// Append to an array node (ignored for other nodes)
    pub fn push(&self, value: impl Into<Data>) {
        if let Node::Array(items) = &mut *self.0.lock() {
            items.push(value.into());
        }
    }

    /// Drop every child of this node (items, properties and hook), breaking
    /// any cycle running through it. An error keeps its name.
    pub fn clear(&self) {
        match &mut *self.0.lock() {
            Node::Array(items) => items.clear(),
            Node::Object(object) => {
                object.properties.clear();
                object.to_json = None;
            }
            Node::Error(error) => error.properties.clear(),
        }
    }

    /// Install a JSON conversion hook on an object node
    pub fn set_to_json<F>(&self, hook: F)
    where
        F: Fn() -> Data + Send + Sync + 'static,
    {
        if let Node::Object(object) = &mut *self.0.lock() {
            object.to_json = Some(Arc::new(hook));
        }
    }

    /// Read a property value
    pub fn get(&self, key: &str) -> Option<Data> {
        let node = self.0.lock();
        let properties = match &*node {
            Node::Object(object) => &object.properties,
            Node::Error(error) => &error.properties,
            Node::Array(_) => return None,
        };
        properties
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.clone())
    }

    /// Display form of an error node: `Name: message`, or just the name
    /// when the message is empty. `None` for other nodes.
    pub fn error_display(&self) -> Option<String> {
        let name = match &*self.0.lock() {
            Node::Error(error) => error.name.clone(),
            _ => return None,
        };
        match self.get("message") {
            Some(Data::String(message)) if !message.is_empty() => {
                Some(format!("{}: {}", name, message))
            }
            _ => Some(name),
        }
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Children are not printed: the graph may be cyclic
        write!(f, "Handle({:#x})", self.id())
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "Undefined"),
            Self::Null => write!(f, "Null"),
            Self::Bool(b) => write!(f, "Bool({})", b),
            Self::Number(n) => write!(f, "Number({})", n),
            Self::String(s) => write!(f, "String({:?})", s),
            Self::Function => write!(f, "Function"),
            Self::Object(handle) => handle.fmt(f),
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<Handle> for Data {
    fn from(handle: Handle) -> Self {
        Data::Object(handle)
    }
}

impl From<&str> for Data {
    fn from(s: &str) -> Self {
        Data::String(s.to_string())
    }
}

impl From<String> for Data {
    fn from(s: String) -> Self {
        Data::String(s)
    }
}

impl From<bool> for Data {
    fn from(b: bool) -> Self {
        Data::Bool(b)
    }
}

impl From<i64> for Data {
    fn from(n: i64) -> Self {
        Data::Number(n.into())
    }
}

impl From<u64> for Data {
    fn from(n: u64) -> Self {
        Data::Number(n.into())
    }
}

impl From<f64> for Data {
    /// Non-finite numbers have no JSON form and become null
    fn from(n: f64) -> Self {
        Number::from_f64(n).map(Data::Number).unwrap_or(Data::Null)
    }
}

impl From<Value> for Data {
    /// Builds a fresh tree: every object and array gets its own node
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Data::Null,
            Value::Bool(b) => Data::Bool(b),
            Value::Number(n) => Data::Number(n),
            Value::String(s) => Data::String(s),
            Value::Array(items) => {
                let handle = Handle::array();
                for item in items {
                    handle.push(Data::from(item));
                }
                Data::Object(handle)
            }
            Value::Object(map) => {
                let handle = Handle::object();
                for (key, item) in map {
                    handle.set(key, Data::from(item));
                }
                Data::Object(handle)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_frees_a_cycle() {
        let obj = Handle::object();
        obj.set("obj", obj.clone());
        obj.set("n", 1i64);
        let weak = Arc::downgrade(&obj.0);

        obj.clear();
        assert!(obj.get("obj").is_none());
        drop(obj);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_clear_keeps_error_name() {
        let error = Handle::error("TypeError", "boom");
        error.clear();
        assert_eq!(error.error_display().as_deref(), Some("TypeError"));
    }

    #[test]
    fn test_handle_identity() {
        let a = Handle::object();
        let b = a.clone();
        let c = Handle::object();
        assert!(a.same(&b));
        assert!(!a.same(&c));
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_set_replaces_existing_property() {
        let obj = Handle::object();
        obj.set("a", 1i64);
        obj.set("a", 2i64);
        match obj.snapshot() {
            Node::Object(object) => assert_eq!(object.properties.len(), 1),
            _ => panic!("Expected object node"),
        }
        assert!(matches!(obj.get("a"), Some(Data::Number(n)) if n.as_i64() == Some(2)));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            Handle::error("TypeError", "bad input").error_display(),
            Some("TypeError: bad input".to_string())
        );
        assert_eq!(
            Handle::error("Error", "").error_display(),
            Some("Error".to_string())
        );
        assert_eq!(Handle::object().error_display(), None);
    }

    #[test]
    fn test_from_error_keeps_source_chain() {
        let outer = crate::error::SinkError::ConfigRead {
            path: "log-sink.toml".into(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        };
        let handle = Handle::from_error(&outer);
        let cause = match handle.get("cause") {
            Some(Data::Object(cause)) => cause,
            other => panic!("Expected nested error, got {:?}", other),
        };
        assert!(matches!(cause.get("message"), Some(Data::String(m)) if m == "disk full"));
        assert!(cause.get("cause").is_none());
    }

    #[test]
    fn test_non_finite_number_becomes_null() {
        assert!(matches!(Data::from(f64::NAN), Data::Null));
        assert!(matches!(Data::from(1.5), Data::Number(_)));
    }

    #[test]
    fn test_debug_does_not_recurse_into_cycles() {
        let obj = Handle::object();
        obj.set("me", obj.clone());
        let printed = format!("{:?}", Data::from(obj));
        assert!(printed.starts_with("Handle("));
    }
}
