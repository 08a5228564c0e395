//! Claim extraction and header encoding.
//!
//! Turns a validated claim tree plus a list of dotted key-paths into the
//! single value forwarded to the backend.
//!
//! # Extraction rules
//!
//! - No key-paths: the whole claim tree
//! - One key-path: that path's resolved value, unwrapped
//! - Several key-paths: an object keyed by the literal path strings, in
//!   configured order (a repeated path keeps its first position, last value)
//!
//! A path is walked segment by segment and stops at the first value that is
//! not an object, even if segments remain. Absent keys resolve to the string
//! `"nil"`.

use serde_json::{Map, Value};
use std::fmt;

/// Decoded token body.
pub type ClaimTree = Map<String, Value>;

/// Value reported for a claim that is not present.
pub const MISSING_CLAIM: &str = "nil";

/// Extract the configured key-paths from a claim tree.
///
/// The tree is only read; extracting twice yields identical results.
pub fn extract(key_paths: &[String], tree: &ClaimTree) -> Value {
    match key_paths {
        [] => Value::Object(tree.clone()),
        [path] => resolve_path(path, tree),
        paths => Value::Object(
            paths
                .iter()
                .map(|path| (path.clone(), resolve_path(path, tree)))
                .collect(),
        ),
    }
}

/// Resolve a single dotted key-path against the tree.
///
/// A one-segment path returns whatever is stored under that key, objects
/// included. A longer path descends through objects; if the walk consumes
/// every segment and still lands on an object the result is `"nil"`.
pub fn resolve_path(path: &str, tree: &ClaimTree) -> Value {
    let mut segments = path.split('.');
    let mut current = tree;

    let Some(first) = segments.next() else {
        return missing();
    };

    let mut value = match current.get(first) {
        Some(value) => value,
        None => return missing(),
    };

    // Single-segment paths return the raw value
    if !path.contains('.') {
        return value.clone();
    }

    for segment in segments {
        match value {
            Value::Object(map) => current = map,
            terminal => return terminal.clone(),
        }
        value = match current.get(segment) {
            Some(value) => value,
            None => return missing(),
        };
    }

    match value {
        Value::Object(_) => missing(),
        terminal => terminal.clone(),
    }
}

fn missing() -> Value {
    Value::String(MISSING_CLAIM.to_string())
}

/// How the extracted value is written into the outbound header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderEncoding {
    /// Compact JSON text.
    Json,
    /// Plain textual form, see [`PlainText`].
    Plain,
}

impl HeaderEncoding {
    /// Pick the encoding from the `PROXY_HEADER_VALUE_AS_JSON` setting.
    pub fn from_json_flag(as_json: bool) -> Self {
        if as_json {
            Self::Json
        } else {
            Self::Plain
        }
    }

    /// Encode an extracted value as header text.
    pub fn encode(self, value: &Value) -> String {
        match self {
            Self::Json => value.to_string(),
            Self::Plain => PlainText(value).to_string(),
        }
    }
}

/// Plain textual rendering of a claim value.
///
/// Strings are written raw, `null` as `nil`, arrays as `[a b c]` and objects
/// as `map[k:v k2:v2]` in insertion order.
pub struct PlainText<'a>(pub &'a Value);

impl fmt::Display for PlainText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Value::Null => f.write_str(MISSING_CLAIM),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", PlainText(item))?;
                }
                f.write_str("]")
            }
            Value::Object(map) => {
                f.write_str("map[")?;
                for (i, (key, item)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{key}:{}", PlainText(item))?;
                }
                f.write_str("]")
            }
        }
    }
}
