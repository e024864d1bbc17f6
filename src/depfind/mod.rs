//! Dependency finder.
//!
//! Importers feed every response scalar they have seen into the finder;
//! later requests whose values match an indexed scalar are rewritten to
//! `{{ producer.path }}` template expressions, which turns otherwise
//! independent imported requests into a producer→consumer graph (a POST
//! returning an id, followed by a GET using that id in its URL).

use std::collections::HashMap;

use serde_json::Value;

use crate::error::NodeError;
use crate::ident::Id;
use crate::namespace::stringify;

/// Where a value was produced: a namespace path rooted at a node's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Producer {
    pub path: String,
    pub node_id: Id,
}

/// One replacement made while templating a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Couple {
    pub value: String,
    pub producer: Producer,
}

/// Result of templating a JSON document.
#[derive(Debug, Clone)]
pub struct TemplatedJson {
    pub bytes: Vec<u8>,
    pub couples: Vec<Couple>,
    pub any_found: bool,
}

/// Reverse index from scalar value to its producer.
#[derive(Debug, Default)]
pub struct DependencyFinder {
    index: HashMap<String, Producer>,
}

impl DependencyFinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Index a single string value as produced at `producer.path`. The first
    /// producer of a value wins; later duplicates do not overwrite it.
    pub fn add_var(&mut self, value: impl Into<String>, producer: Producer) {
        self.index.entry(value.into()).or_insert(producer);
    }

    /// Recursively index every scalar in a JSON document, extending the
    /// producer path as the walk descends: object keys append `.key`, array
    /// elements append `[i]`.
    pub fn add_json(&mut self, bytes: &[u8], root: Producer) -> Result<(), NodeError> {
        let doc: Value = serde_json::from_slice(bytes)?;
        self.index_value(&doc, &root.path, root.node_id);
        Ok(())
    }

    fn index_value(&mut self, value: &Value, path: &str, node_id: Id) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    self.index_value(child, &format!("{path}.{key}"), node_id);
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    self.index_value(child, &format!("{path}[{i}]"), node_id);
                }
            }
            Value::Null => {}
            scalar => {
                self.add_var(
                    stringify(scalar),
                    Producer {
                        path: path.to_string(),
                        node_id,
                    },
                );
            }
        }
    }

    /// Exact-match lookup.
    pub fn find(&self, value: &str) -> Option<&Producer> {
        self.index.get(value)
    }

    /// Walk a JSON document, replacing every scalar leaf whose value is
    /// indexed with `"{{ producer.path }}"`. One couple is collected per
    /// replacement.
    pub fn template_json(&self, bytes: &[u8]) -> Result<TemplatedJson, NodeError> {
        let mut doc: Value = serde_json::from_slice(bytes)?;
        let mut couples = Vec::new();
        self.template_value(&mut doc, &mut couples);
        let any_found = !couples.is_empty();
        Ok(TemplatedJson {
            bytes: serde_json::to_vec(&doc)?,
            couples,
            any_found,
        })
    }

    fn template_value(&self, value: &mut Value, couples: &mut Vec<Couple>) {
        match value {
            Value::Object(map) => {
                for (_, child) in map.iter_mut() {
                    self.template_value(child, couples);
                }
            }
            Value::Array(items) => {
                for child in items.iter_mut() {
                    self.template_value(child, couples);
                }
            }
            Value::Null => {}
            ref scalar => {
                let text = stringify(scalar);
                if let Some(producer) = self.index.get(&text) {
                    couples.push(Couple {
                        value: text,
                        producer: producer.clone(),
                    });
                    *value = Value::String(format!("{{{{ {} }}}}", producer.path));
                }
            }
        }
    }

    /// Tokenize a URL by `/` and replace each segment that matches an
    /// indexed value. Query strings are left untouched.
    pub fn replace_url_path(&self, url: &str) -> (String, bool, Vec<Couple>) {
        let (path_part, query_part) = match url.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (url, None),
        };

        let mut couples = Vec::new();
        let replaced: Vec<String> = path_part
            .split('/')
            .map(|segment| {
                if segment.is_empty() {
                    return segment.to_string();
                }
                match self.index.get(segment) {
                    Some(producer) => {
                        couples.push(Couple {
                            value: segment.to_string(),
                            producer: producer.clone(),
                        });
                        format!("{{{{ {} }}}}", producer.path)
                    }
                    None => segment.to_string(),
                }
            })
            .collect();

        let mut out = replaced.join("/");
        if let Some(q) = query_part {
            out.push('?');
            out.push_str(q);
        }
        let found = !couples.is_empty();
        (out, found, couples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::{FakeIdSource, IdSource};
    use serde_json::json;

    fn producer(path: &str, id: Id) -> Producer {
        Producer {
            path: path.to_string(),
            node_id: id,
        }
    }

    #[test]
    fn test_add_var_and_find() {
        let ids = FakeIdSource::new();
        let id = ids.next_id();
        let mut finder = DependencyFinder::new();
        finder.add_var("T-123", producer("login.response.body.token", id));

        let hit = finder.find("T-123").unwrap();
        assert_eq!(hit.path, "login.response.body.token");
        assert!(finder.find("T-999").is_none());
    }

    #[test]
    fn test_add_json_indexes_every_scalar() {
        let ids = FakeIdSource::new();
        let id = ids.next_id();
        let mut finder = DependencyFinder::new();
        let body = json!({"user": {"id": "u-1", "tags": ["a", "b"]}, "count": 2});
        finder
            .add_json(
                serde_json::to_vec(&body).unwrap().as_slice(),
                producer("login.response.body", id),
            )
            .unwrap();

        assert_eq!(
            finder.find("u-1").unwrap().path,
            "login.response.body.user.id"
        );
        assert_eq!(
            finder.find("b").unwrap().path,
            "login.response.body.user.tags[1]"
        );
        assert_eq!(finder.find("2").unwrap().path, "login.response.body.count");
    }

    #[test]
    fn test_template_json_replaces_and_counts() {
        let ids = FakeIdSource::new();
        let id = ids.next_id();
        let mut finder = DependencyFinder::new();
        finder.add_var("u-1", producer("login.response.body.user.id", id));

        let doc = json!({"user_id": "u-1", "untouched": "x", "copies": ["u-1"]});
        let result = finder
            .template_json(serde_json::to_vec(&doc).unwrap().as_slice())
            .unwrap();

        assert!(result.any_found);
        // one couple per replacement
        assert_eq!(result.couples.len(), 2);
        let templated: Value = serde_json::from_slice(&result.bytes).unwrap();
        assert_eq!(
            templated["user_id"],
            json!("{{ login.response.body.user.id }}")
        );
        assert_eq!(
            templated["copies"][0],
            json!("{{ login.response.body.user.id }}")
        );
        assert_eq!(templated["untouched"], json!("x"));
    }

    #[test]
    fn test_template_json_nothing_found() {
        let finder = DependencyFinder::new();
        let doc = json!({"a": 1});
        let result = finder
            .template_json(serde_json::to_vec(&doc).unwrap().as_slice())
            .unwrap();
        assert!(!result.any_found);
        assert!(result.couples.is_empty());
    }

    #[test]
    fn test_replace_url_path() {
        let ids = FakeIdSource::new();
        let id = ids.next_id();
        let mut finder = DependencyFinder::new();
        finder.add_var("u-1", producer("login.response.body.user.id", id));

        let (url, found, couples) = finder.replace_url_path("http://svc/users/u-1/posts?page=2");
        assert!(found);
        assert_eq!(couples.len(), 1);
        assert_eq!(
            url,
            "http://svc/users/{{ login.response.body.user.id }}/posts?page=2"
        );
    }

    #[test]
    fn test_replace_url_path_no_match() {
        let finder = DependencyFinder::new();
        let (url, found, couples) = finder.replace_url_path("http://svc/users");
        assert!(!found);
        assert!(couples.is_empty());
        assert_eq!(url, "http://svc/users");
    }

    #[test]
    fn test_first_producer_wins() {
        let ids = FakeIdSource::new();
        let first = ids.next_id();
        let second = ids.next_id();
        let mut finder = DependencyFinder::new();
        finder.add_var("v", producer("a.b", first));
        finder.add_var("v", producer("c.d", second));
        assert_eq!(finder.find("v").unwrap().path, "a.b");
    }
}
