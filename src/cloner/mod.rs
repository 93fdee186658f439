//! Structural cloner
//!
//! Turns application data (`Data` graphs, possibly cyclic) into plain JSON
//! that is always safe to serialize:
//!
//! - functions and undefined values disappear
//! - subtrees nested deeper than `max_depth` become `"[Too deep]"`
//! - a node met a second time becomes `"[Reference to <path>]"`, naming the
//!   path where it was first seen
//! - errors keep all own properties (minus a few noisy ones) and get a
//!   normalized `stack` array
//!
//! The visited map is keyed by node identity and lives for one call only.

mod data;
mod stack;

pub use data::{Data, ErrorNode, Handle, Node, ObjectNode, Property, ToJson};
pub use stack::prepare_stack;

use crate::constants::{DEFAULT_MAX_DEPTH, TOO_DEEP};
use crate::error::{Result, SinkError};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Error properties never copied (complex and useless in practice)
const IGNORED_ERROR_PROPERTIES: [&str; 4] =
    ["domain", "domainEmitter", "domainBound", "domainThrown"];

/// Root path used by `prepare_error`
const ERROR_ROOT: &str = "error";

/// Root path used by `clone_extra`
const EXTRA_ROOT: &str = "extra";

/// Cycle-safe, depth-bounded deep copy into JSON
#[derive(Debug, Clone)]
pub struct StructuralCloner {
    max_depth: usize,
    base_path: Option<String>,
}

/// Nodes seen during one clone, by address, with the path of their first
/// visit. Each entry holds its handle so no address is reused mid-clone.
type Visited = HashMap<usize, (Handle, String)>;

impl Default for StructuralCloner {
    fn default() -> Self {
        Self::new()
    }
}

impl StructuralCloner {
    /// Cloner with the default depth bound, rewriting stack paths relative
    /// to the current working directory
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            base_path: std::env::current_dir()
                .ok()
                .map(|p| p.display().to_string()),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Prefix replaced by `.` in stack frames (`None` keeps frames untouched)
    pub fn with_base_path(mut self, base_path: Option<String>) -> Self {
        self.base_path = base_path;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Prepare an error for logging.
    ///
    /// Null and undefined give `null`; any other primitive is rejected.
    pub fn prepare_error(&self, error: &Data) -> Result<Value> {
        match error {
            Data::Null | Data::Undefined => Ok(Value::Null),
            Data::Object(_) => Ok(self.clone_at(error, ERROR_ROOT).unwrap_or(Value::Null)),
            other => Err(SinkError::invalid(
                "error",
                format!("Invalid error, expected an object, got {:?}", other),
            )),
        }
    }

    /// Clone arbitrary extra data. `None` when the value has no JSON form
    /// (a function or undefined).
    pub fn clone_extra(&self, value: &Data) -> Option<Value> {
        self.clone_at(value, EXTRA_ROOT)
    }

    /// Clone `value`, naming the root `root` in reference markers
    pub fn clone_at(&self, value: &Data, root: &str) -> Option<Value> {
        let mut visited = Visited::new();
        self.copy(value, root, 0, &mut visited)
    }

    fn copy(
        &self,
        value: &Data,
        path: &str,
        depth: usize,
        visited: &mut Visited,
    ) -> Option<Value> {
        let handle = match value {
            Data::Undefined | Data::Function => return None,
            Data::Null => return Some(Value::Null),
            Data::Bool(b) => return Some(Value::Bool(*b)),
            Data::Number(n) => return Some(Value::Number(n.clone())),
            Data::String(s) => return Some(Value::String(s.clone())),
            Data::Object(handle) => handle,
        };

        if depth > self.max_depth {
            return Some(Value::String(TOO_DEEP.to_string()));
        }

        if let Some((_, first)) = visited.get(&handle.id()) {
            return Some(Value::String(format!("[Reference to {}]", first)));
        }
        visited.insert(handle.id(), (handle.clone(), path.to_string()));

        match handle.snapshot() {
            Node::Object(ObjectNode {
                to_json: Some(to_json),
                ..
            }) => self.copy(&to_json(), path, depth, visited),
            Node::Array(items) => {
                let copied = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        self.copy(item, &format!("{}.{}", path, i), depth + 1, visited)
                            .unwrap_or(Value::Null)
                    })
                    .collect();
                Some(Value::Array(copied))
            }
            Node::Error(error) => Some(self.copy_error(error, path, depth, visited)),
            Node::Object(object) => {
                let mut copied = Map::new();
                for property in object.properties.iter().filter(|p| p.enumerable) {
                    let child = format!("{}.{}", path, property.key);
                    if let Some(v) = self.copy(&property.value, &child, depth + 1, visited) {
                        copied.insert(property.key.clone(), v);
                    }
                }
                Some(Value::Object(copied))
            }
        }
    }

    fn copy_error(
        &self,
        error: ErrorNode,
        path: &str,
        depth: usize,
        visited: &mut Visited,
    ) -> Value {
        let mut copied = Map::new();
        copied.insert("stack".to_string(), Value::Array(Vec::new()));

        for property in &error.properties {
            let key = property.key.as_str();
            if IGNORED_ERROR_PROPERTIES.contains(&key) {
                continue;
            }

            if key == "stack" {
                let frames = match &property.value {
                    Data::String(text) => prepare_stack(text, self.base_path.as_deref()),
                    _ => Vec::new(),
                };
                copied.insert(
                    "stack".to_string(),
                    Value::Array(frames.into_iter().map(Value::String).collect()),
                );
                continue;
            }

            let child = format!("{}.{}", path, key);
            if let Some(v) = self.copy(&property.value, &child, depth + 1, visited) {
                copied.insert(key.to_string(), v);
            }
        }

        Value::Object(copied)
    }
}
