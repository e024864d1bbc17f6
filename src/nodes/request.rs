//! Request node: materializes a stored HTTP template, substitutes `{{ }}`
//! expressions, dispatches the call, publishes the exchange under the
//! node's name, evaluates assertions, and hands the response record to the
//! persister.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use tokio::sync::oneshot;

use super::{NodeOutcome, NodeRequest, NodeRunner};
use crate::error::{FlowError, NodeError};
use crate::expr::{self, PathReader};
use crate::ident::Id;
use crate::model::{
    CompressKind, Handle, HttpKv, HttpResponseRecord, KvKind, NodeKind, RequestNode,
};
use crate::namespace::read_value;
use crate::repo::Repository;
use crate::runner::persist::ResponseMsg;

/// Fully materialized request template: base fields overlaid with the
/// delta example's overrides. For any field present in both, the delta
/// wins.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub http_id: Id,
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub queries: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub asserts: Vec<String>,
}

/// Load and overlay the base and delta templates referenced by a request
/// node config.
pub async fn materialize_request(
    repo: &dyn Repository,
    cfg: &RequestNode,
) -> Result<RequestSpec, FlowError> {
    let base_id = cfg
        .example_id
        .or(cfg.endpoint_id)
        .ok_or_else(|| FlowError::NotFound("request node has no template binding".to_string()))?;
    let base = repo.get_request_def(base_id).await?;

    let mut method = base.method;
    let mut url = base.url;
    let mut body = repo.get_body_raw(base_id).await?.map(|b| b.data);

    let mut header_rows = repo.list_kv(base_id, KvKind::Header).await?;
    let mut query_rows = repo.list_kv(base_id, KvKind::Query).await?;
    let mut asserts = repo.list_asserts(base_id).await?;

    if let Some(delta_id) = cfg.delta_example_id {
        let delta = repo.get_request_def(delta_id).await?;
        if !delta.method.is_empty() {
            method = delta.method;
        }
        if !delta.url.is_empty() {
            url = delta.url;
        }
        if let Some(delta_body) = repo.get_body_raw(delta_id).await? {
            body = Some(delta_body.data);
        }
        overlay_kv(&mut header_rows, repo.list_delta_kv(delta_id, KvKind::Header).await?);
        overlay_kv(&mut query_rows, repo.list_delta_kv(delta_id, KvKind::Query).await?);
        for delta_assert in repo.list_delta_asserts(delta_id).await? {
            match delta_assert
                .delta_parent_id
                .and_then(|parent| asserts.iter_mut().find(|a| a.id == parent))
            {
                Some(slot) => {
                    slot.expression = delta_assert.expression;
                    slot.enabled = delta_assert.enabled;
                }
                None => asserts.push(delta_assert),
            }
        }
    }

    Ok(RequestSpec {
        http_id: base_id,
        method,
        url,
        headers: enabled_pairs(header_rows),
        queries: enabled_pairs(query_rows),
        body,
        asserts: asserts
            .into_iter()
            .filter(|a| a.enabled)
            .map(|a| a.expression)
            .collect(),
    })
}

fn overlay_kv(base: &mut Vec<HttpKv>, delta: Vec<HttpKv>) {
    for row in delta {
        match row
            .delta_parent_id
            .and_then(|parent| base.iter_mut().find(|b| b.id == parent))
        {
            Some(slot) => {
                slot.key = row.key;
                slot.value = row.value;
                slot.enabled = row.enabled;
            }
            None => base.push(row),
        }
    }
}

fn enabled_pairs(rows: Vec<HttpKv>) -> Vec<(String, String)> {
    rows.into_iter()
        .filter(|r| r.enabled)
        .map(|r| (r.key, r.value))
        .collect()
}

pub struct RequestRunner {
    id: Id,
    name: String,
    spec: RequestSpec,
}

impl RequestRunner {
    pub fn new(id: Id, name: impl Into<String>, spec: RequestSpec) -> Self {
        Self {
            id,
            name: name.into(),
            spec,
        }
    }
}

/// Resolves assertion paths: `response.*` and `request.*` hit the node's
/// own exchange, anything else falls through to the namespace.
struct AssertScope<'a> {
    local: &'a Value,
    req: &'a NodeRequest,
}

impl PathReader for AssertScope<'_> {
    fn read_path(&self, path: &str) -> Result<Value, NodeError> {
        let first = path.split(['.', '[']).next().unwrap_or(path);
        if first == "response" || first == "request" {
            return read_value(self.local, path);
        }
        self.req.tracker.read(path)
    }
}

#[async_trait]
impl NodeRunner for RequestRunner {
    fn id(&self) -> Id {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Request
    }

    async fn run(&self, req: &NodeRequest) -> Result<NodeOutcome, NodeError> {
        req.check_cancelled()?;

        // substitution phase
        let url = req.tracker.substitute(&self.spec.url)?;
        let mut headers = Vec::with_capacity(self.spec.headers.len());
        for (key, value) in &self.spec.headers {
            headers.push((key.clone(), req.tracker.substitute(value)?));
        }
        let mut queries = Vec::with_capacity(self.spec.queries.len());
        for (key, value) in &self.spec.queries {
            queries.push((key.clone(), req.tracker.substitute(value)?));
        }
        let body = match &self.spec.body {
            Some(bytes) => Some(match std::str::from_utf8(bytes) {
                Ok(text) => req.tracker.substitute(text)?.into_bytes(),
                Err(_) => bytes.clone(),
            }),
            None => None,
        };

        let method = reqwest::Method::from_bytes(self.spec.method.as_bytes())
            .map_err(|_| NodeError::ConfigError(format!("bad method {}", self.spec.method)))?;

        let mut builder = req
            .http
            .client()
            .request(method, &url)
            .timeout(req.per_node_timeout);
        for (key, value) in &headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if !queries.is_empty() {
            builder = builder.query(&queries);
        }
        if let Some(bytes) = body.clone() {
            builder = builder.body(bytes);
        }

        tracing::debug!(node = %self.name, %url, "dispatching request");
        let started = Instant::now();
        let exchange = tokio::select! {
            result = send_and_read(builder) => result,
            _ = req.cancel.cancelled() => return Err(NodeError::Canceled),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let (status, resp_headers, resp_body, transport_error) = match exchange {
            Ok((status, headers, bytes)) => (status, headers, bytes, None),
            Err(error) => (0u16, Vec::new(), Vec::new(), Some(error)),
        };

        // persist the exchange even when the transport failed
        let record = HttpResponseRecord {
            id: req.ids.next_id(),
            http_id: self.spec.http_id,
            status,
            body: resp_body.clone(),
            body_compress_kind: CompressKind::None,
            headers: resp_headers.clone(),
            duration_ms,
            size: resp_body.len() as u64,
            time: Utc::now(),
            created_at: Utc::now(),
            error: transport_error.as_ref().map(|e| e.to_string()),
        };
        enqueue_response(req, record).await?;

        if let Some(error) = transport_error {
            return Err(error);
        }

        // publish under the node's name
        let body_value = parse_body(&resp_body);
        let request_body_value = body.as_deref().map(|b| parse_body(b)).unwrap_or(Value::Null);
        let mut output = Map::new();
        output.insert(
            "request".to_string(),
            json!({
                "method": self.spec.method,
                "url": url,
                "headers": pairs_to_object(&headers),
                "queries": pairs_to_object(&queries),
                "body": request_body_value,
            }),
        );
        output.insert(
            "response".to_string(),
            json!({
                "status": status,
                "headers": pairs_to_object(&resp_headers),
                "body": body_value,
                "duration": duration_ms,
            }),
        );

        // assertions observe the exchange but cannot fail the node
        let local = Value::Object(output.clone());
        let mut assert_results = Vec::new();
        let mut soft_error = None;
        for expression in &self.spec.asserts {
            let scope = AssertScope { local: &local, req };
            let result = expr::evaluate(expression, &scope);
            let passed = matches!(&result, Ok(true));
            if !passed && soft_error.is_none() {
                soft_error = Some(NodeError::AssertFailed(expression.clone()));
            }
            assert_results.push(json!({
                "expression": expression,
                "passed": passed,
                "error": result.err().map(|e| e.to_string()),
            }));
        }
        if !assert_results.is_empty() {
            output.insert("asserts".to_string(), Value::Array(assert_results));
        }

        req.tracker
            .write(self.name.clone(), Value::Object(output.clone()));

        Ok(NodeOutcome {
            next_handles: vec![Handle::Unspecified],
            outputs: output,
            soft_error,
        })
    }
}

async fn send_and_read(
    builder: reqwest::RequestBuilder,
) -> Result<(u16, Vec<(String, String)>, Vec<u8>), NodeError> {
    let response = builder.send().await.map_err(map_reqwest_error)?;
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    let body = response
        .bytes()
        .await
        .map_err(map_reqwest_error)?
        .to_vec();
    Ok((status, headers, body))
}

fn map_reqwest_error(error: reqwest::Error) -> NodeError {
    if error.is_timeout() {
        NodeError::Timeout
    } else {
        NodeError::RequestFailed(error.to_string())
    }
}

async fn enqueue_response(req: &NodeRequest, record: HttpResponseRecord) -> Result<(), NodeError> {
    let (done_tx, done_rx) = oneshot::channel();
    let msg = ResponseMsg {
        record,
        done: done_tx,
    };
    let send = tokio::select! {
        sent = req.responses.send(msg) => sent,
        _ = req.cancel.cancelled() => return Err(NodeError::Canceled),
    };
    if send.is_err() {
        // consumer already gone; nothing left to wait for
        return Ok(());
    }
    tokio::select! {
        _ = done_rx => Ok(()),
        _ = req.cancel.cancelled() => Err(NodeError::Canceled),
    }
}

/// JSON bodies are parsed; anything else is kept as a string.
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
        return value;
    }
    Value::String(String::from_utf8_lossy(bytes).into_owned())
}

fn pairs_to_object(pairs: &[(String, String)]) -> Value {
    let mut map = Map::new();
    for (key, value) in pairs {
        map.insert(key.clone(), Value::String(value.clone()));
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::{FakeIdSource, IdSource};
    use crate::model::HttpRequestDef;
    use crate::repo::MemoryRepository;

    fn kv(ids: &FakeIdSource, http: Id, kind: KvKind, key: &str, value: &str) -> HttpKv {
        HttpKv {
            id: ids.next_id(),
            http_id: http,
            kind,
            key: key.into(),
            value: value.into(),
            enabled: true,
            delta_parent_id: None,
            prev_id: None,
            next_id: None,
        }
    }

    #[test]
    fn test_parse_body_variants() {
        assert_eq!(parse_body(b""), Value::Null);
        assert_eq!(parse_body(b"{\"a\":1}"), json!({"a": 1}));
        assert_eq!(parse_body(b"plain text"), json!("plain text"));
    }

    #[test]
    fn test_overlay_kv_replaces_and_appends() {
        let ids = FakeIdSource::new();
        let http = ids.next_id();
        let mut base = vec![
            kv(&ids, http, KvKind::Header, "Accept", "application/json"),
            kv(&ids, http, KvKind::Header, "X-Trace", "1"),
        ];
        let accept_id = base[0].id;

        let mut replacement = kv(&ids, http, KvKind::Header, "Accept", "text/plain");
        replacement.delta_parent_id = Some(accept_id);
        let extra = kv(&ids, http, KvKind::Header, "X-Extra", "yes");

        overlay_kv(&mut base, vec![replacement, extra]);
        let pairs = enabled_pairs(base);
        assert_eq!(
            pairs,
            vec![
                ("Accept".to_string(), "text/plain".to_string()),
                ("X-Trace".to_string(), "1".to_string()),
                ("X-Extra".to_string(), "yes".to_string()),
            ]
        );
    }

    #[test]
    fn test_overlay_kv_delta_can_disable() {
        let ids = FakeIdSource::new();
        let http = ids.next_id();
        let mut base = vec![kv(&ids, http, KvKind::Header, "Accept", "application/json")];
        let accept_id = base[0].id;

        let mut disable = kv(&ids, http, KvKind::Header, "Accept", "application/json");
        disable.delta_parent_id = Some(accept_id);
        disable.enabled = false;

        overlay_kv(&mut base, vec![disable]);
        assert!(enabled_pairs(base).is_empty());
    }

    #[tokio::test]
    async fn test_materialize_with_delta() {
        let ids = FakeIdSource::new();
        let repo = MemoryRepository::new();
        let workspace = ids.next_id();

        let base_id = ids.next_id();
        repo.create_request_def(HttpRequestDef {
            id: base_id,
            workspace_id: workspace,
            name: "login".into(),
            method: "POST".into(),
            url: "http://svc/login".into(),
        })
        .await
        .unwrap();
        let base_header = kv(&ids, base_id, KvKind::Header, "Accept", "application/json");
        let base_header_id = base_header.id;
        repo.create_kv(base_header).await.unwrap();

        let delta_id = ids.next_id();
        repo.create_request_def(HttpRequestDef {
            id: delta_id,
            workspace_id: workspace,
            name: "login (delta)".into(),
            method: String::new(),
            url: "http://svc/v2/login".into(),
        })
        .await
        .unwrap();
        let mut delta_header = kv(&ids, delta_id, KvKind::Header, "Accept", "text/plain");
        delta_header.delta_parent_id = Some(base_header_id);
        repo.create_kv(delta_header).await.unwrap();

        let node_id = ids.next_id();
        let spec = materialize_request(
            &repo,
            &RequestNode {
                flow_node_id: node_id,
                endpoint_id: None,
                example_id: Some(base_id),
                delta_example_id: Some(delta_id),
            },
        )
        .await
        .unwrap();

        // delta wins where both define the field
        assert_eq!(spec.method, "POST");
        assert_eq!(spec.url, "http://svc/v2/login");
        assert_eq!(
            spec.headers,
            vec![("Accept".to_string(), "text/plain".to_string())]
        );
        assert_eq!(spec.http_id, base_id);
    }

    #[tokio::test]
    async fn test_materialize_without_binding_fails() {
        let ids = FakeIdSource::new();
        let repo = MemoryRepository::new();
        let result = materialize_request(
            &repo,
            &RequestNode {
                flow_node_id: ids.next_id(),
                endpoint_id: None,
                example_id: None,
                delta_example_id: None,
            },
        )
        .await;
        assert!(result.is_err());
    }
}
