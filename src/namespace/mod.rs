//! The variable namespace.
//!
//! A [`Namespace`] maps top-level string keys to values of dynamic shape
//! (null, bool, number, string, array, object). Nodes read through dotted
//! path expressions with optional bracketed indices (`a.b[0].c`) and write
//! whole top-level keys. Templated strings reference the namespace with
//! `{{ expr }}` and are expanded by [`Namespace::substitute`].
//!
//! During a node run the namespace is accessed through a
//! [`NamespaceTracker`], which records every path read and written; the
//! recorded writes, grouped by their first path segment, become the output
//! tree persisted with the node's execution record.

mod path;
mod tracker;

pub use path::{parse_path, PathSeg};
pub use tracker::NamespaceTracker;

use std::sync::Arc;
use std::sync::OnceLock;

use parking_lot::RwLock;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::NodeError;

/// Maximum `{{ }}` expansion passes before substitution is treated as a
/// self-referencing corruption.
const MAX_SUBSTITUTION_DEPTH: usize = 16;

fn template_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("template pattern"))
}

/// Mutable mapping from string keys to dynamically-shaped values.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    values: Map<String, Value>,
}

/// Namespace shared between concurrent loop iterations, guarded by a
/// readers/writer lock.
pub type SharedNamespace = Arc<RwLock<Namespace>>;

impl Namespace {
    pub fn new() -> Self {
        Self { values: Map::new() }
    }

    /// Seed the namespace from flow variables.
    pub fn from_variables<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut ns = Self::new();
        for (key, value) in vars {
            ns.write(key, value);
        }
        ns
    }

    pub fn into_shared(self) -> SharedNamespace {
        Arc::new(RwLock::new(self))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Read a dotted path expression. Fails with [`NodeError::PathNotFound`]
    /// on any missing segment; the message carries the full path.
    pub fn read(&self, path: &str) -> Result<Value, NodeError> {
        let segs = parse_path(path)?;
        let mut current: Option<&Value> = None;
        for seg in &segs {
            current = match (current, seg) {
                (None, PathSeg::Key(key)) => self.values.get(key.as_str()),
                (None, PathSeg::Index(_)) => None,
                (Some(Value::Object(map)), PathSeg::Key(key)) => map.get(key.as_str()),
                (Some(Value::Array(items)), PathSeg::Index(i)) => items.get(*i),
                _ => None,
            };
            if current.is_none() {
                return Err(NodeError::PathNotFound(path.to_string()));
            }
        }
        current
            .cloned()
            .ok_or_else(|| NodeError::PathNotFound(path.to_string()))
    }

    /// Whether the path resolves to a value.
    pub fn has(&self, path: &str) -> bool {
        self.read(path).is_ok()
    }

    /// Write a value at the top level. Nested writes replace the top value.
    pub fn write(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Replace every `{{ expr }}` occurrence with the string form of
    /// `read(expr)`. If the entire template is exactly one expression and
    /// the referenced value is a string, the raw string is returned;
    /// non-string values are stringified (numbers minimal, booleans as
    /// `true`/`false`, containers as JSON).
    pub fn substitute(&self, template: &str) -> Result<String, NodeError> {
        if !template_regex().is_match(template) {
            return Ok(template.to_string());
        }
        // first pass is strict; values may themselves carry template text,
        // so further passes expand what still resolves
        let mut current = self.substitute_once(template)?;
        for _ in 1..MAX_SUBSTITUTION_DEPTH {
            if !template_regex().is_match(&current) {
                return Ok(current);
            }
            match self.substitute_once(&current) {
                Ok(next) if next != current => current = next,
                // a fixed point that still substitutes means the value
                // references itself
                Ok(_) => {
                    return Err(NodeError::Corruption(format!(
                        "self-referencing value in template: {template}"
                    )))
                }
                // leftover braces that are plain data, not references
                Err(_) => return Ok(current),
            }
        }
        Err(NodeError::Corruption(format!(
            "substitution did not converge for template: {template}"
        )))
    }

    fn substitute_once(&self, template: &str) -> Result<String, NodeError> {
        let re = template_regex();
        let mut out = String::with_capacity(template.len());
        let mut last_end = 0;
        for caps in re.captures_iter(template) {
            let whole = caps.get(0).expect("match 0 always present");
            let expr = caps.get(1).expect("capture 1 always present").as_str();
            out.push_str(&template[last_end..whole.start()]);
            let value = self.read(expr)?;
            out.push_str(&stringify(&value));
            last_end = whole.end();
        }
        out.push_str(&template[last_end..]);
        Ok(out)
    }

    /// Snapshot the whole namespace as a JSON object.
    pub fn snapshot(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

/// Read a dotted path inside an arbitrary JSON value.
pub fn read_value(root: &Value, path: &str) -> Result<Value, NodeError> {
    let segs = parse_path(path)?;
    let mut current = root;
    for seg in &segs {
        current = match (current, seg) {
            (Value::Object(map), PathSeg::Key(key)) => map.get(key.as_str()),
            (Value::Array(items), PathSeg::Index(i)) => items.get(*i),
            _ => None,
        }
        .ok_or_else(|| NodeError::PathNotFound(path.to_string()))?;
    }
    Ok(current.clone())
}

/// Expressions referenced by a template, in order of appearance.
pub(crate) fn template_exprs(template: &str) -> Vec<String> {
    template_regex()
        .captures_iter(template)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}

/// String form of a namespace value: strings verbatim, numbers in their
/// minimal representation, booleans as `true`/`false`, containers as JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
