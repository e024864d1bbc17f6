//! Read/write tracking around the shared namespace.
//!
//! One tracker exists per node run. Reads record the path and the value
//! observed; writes record the top-level key and the value written. The
//! write log, grouped by first path segment, is the output tree stored on
//! the node's execution record; the read log forms the input tree.

use parking_lot::Mutex;
use serde_json::{Map, Value};

use super::{template_exprs, SharedNamespace};
use crate::error::NodeError;

#[derive(Debug, Default)]
struct TrackLog {
    reads: Vec<(String, Value)>,
    writes: Vec<(String, Value)>,
}

/// Tracked view over the shared namespace for a single node run.
pub struct NamespaceTracker {
    shared: SharedNamespace,
    log: Mutex<TrackLog>,
}

impl NamespaceTracker {
    pub fn new(shared: SharedNamespace) -> Self {
        Self {
            shared,
            log: Mutex::new(TrackLog::default()),
        }
    }

    pub fn shared(&self) -> &SharedNamespace {
        &self.shared
    }

    /// Read a path, recording it and the observed value.
    pub fn read(&self, path: &str) -> Result<Value, NodeError> {
        let value = self.shared.read().read(path)?;
        self.log.lock().reads.push((path.to_string(), value.clone()));
        Ok(value)
    }

    /// Write a top-level key, recording the value.
    pub fn write(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.log.lock().writes.push((key.clone(), value.clone()));
        self.shared.write().write(key, value);
    }

    /// Substitute `{{ }}` expressions, recording each referenced path.
    pub fn substitute(&self, template: &str) -> Result<String, NodeError> {
        let guard = self.shared.read();
        for expr in template_exprs(template) {
            if let Ok(value) = guard.read(&expr) {
                self.log.lock().reads.push((expr, value));
            }
        }
        guard.substitute(template)
    }

    /// Paths read so far, in order.
    pub fn read_paths(&self) -> Vec<String> {
        self.log.lock().reads.iter().map(|(p, _)| p.clone()).collect()
    }

    /// Input tree: the values observed by reads, keyed by path.
    pub fn input_tree(&self) -> Value {
        let mut map = Map::new();
        for (path, value) in &self.log.lock().reads {
            map.insert(path.clone(), value.clone());
        }
        Value::Object(map)
    }

    /// Output tree: recorded writes grouped by their first path segment;
    /// for repeated writes to one key the last value wins.
    pub fn output_tree(&self) -> Value {
        let mut map = Map::new();
        for (key, value) in &self.log.lock().writes {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Namespace;
    use serde_json::json;

    fn tracker() -> NamespaceTracker {
        let mut ns = Namespace::new();
        ns.write("login", json!({"response": {"body": {"token": "T"}}}));
        NamespaceTracker::new(ns.into_shared())
    }

    #[test]
    fn test_reads_are_recorded() {
        let t = tracker();
        t.read("login.response.body.token").unwrap();
        assert_eq!(t.read_paths(), vec!["login.response.body.token"]);
        assert_eq!(
            t.input_tree(),
            json!({"login.response.body.token": "T"})
        );
    }

    #[test]
    fn test_writes_are_recorded_and_visible() {
        let t = tracker();
        t.write("me", json!({"response": {"status": 200}}));
        assert_eq!(t.output_tree(), json!({"me": {"response": {"status": 200}}}));
        assert_eq!(t.read("me.response.status").unwrap(), json!(200));
    }

    #[test]
    fn test_substitute_records_referenced_paths() {
        let t = tracker();
        let out = t
            .substitute("Bearer {{ login.response.body.token }}")
            .unwrap();
        assert_eq!(out, "Bearer T");
        assert_eq!(t.read_paths(), vec!["login.response.body.token"]);
    }

    #[test]
    fn test_last_write_wins_in_output_tree() {
        let t = tracker();
        t.write("loop", json!({"index": 0}));
        t.write("loop", json!({"index": 1}));
        assert_eq!(t.output_tree(), json!({"loop": {"index": 1}}));
    }
}
