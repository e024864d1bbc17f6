//! Remote JavaScript evaluator client.
//!
//! The core does not embed a JS runtime. Script nodes hand their code plus
//! a namespace snapshot to a [`JsEvaluator`]; the evaluator returns the
//! variables the script wrote, which the node merges back into the
//! namespace under its own name.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::NodeError;

/// Result of one evaluator call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsEvalResult {
    #[serde(default)]
    pub written_vars: Map<String, Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Abstract evaluator interface. Each call is independent; the shared
/// client is safe for concurrent use.
#[async_trait]
pub trait JsEvaluator: Send + Sync {
    async fn eval(&self, code: &[u8], namespace: Value) -> Result<JsEvalResult, NodeError>;
}

#[derive(Debug, Serialize)]
struct EvalRequest<'a> {
    code: &'a str,
    namespace: &'a Value,
}

/// Evaluator backed by a remote HTTP endpoint: POSTs `{code, namespace}`
/// and expects a [`JsEvalResult`] body.
pub struct RemoteJsEvaluator {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteJsEvaluator {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl JsEvaluator for RemoteJsEvaluator {
    async fn eval(&self, code: &[u8], namespace: Value) -> Result<JsEvalResult, NodeError> {
        let code = std::str::from_utf8(code)
            .map_err(|_| NodeError::JsError("script is not valid UTF-8".to_string()))?;
        let response = self
            .client
            .post(&self.endpoint)
            .json(&EvalRequest {
                code,
                namespace: &namespace,
            })
            .send()
            .await
            .map_err(|e| NodeError::JsError(e.to_string()))?;

        let result: JsEvalResult = response
            .json()
            .await
            .map_err(|e| NodeError::JsError(e.to_string()))?;
        if let Some(error) = result.error {
            return Err(NodeError::JsError(error));
        }
        Ok(result)
    }
}

/// Evaluator used when no remote endpoint is configured; every call fails.
pub struct NullJsEvaluator;

#[async_trait]
impl JsEvaluator for NullJsEvaluator {
    async fn eval(&self, _code: &[u8], _namespace: Value) -> Result<JsEvalResult, NodeError> {
        Err(NodeError::JsError(
            "no JS evaluator configured for this run".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_evaluator_fails() {
        let result = NullJsEvaluator
            .eval(b"ns.write('x', 1)", Value::Null)
            .await;
        assert!(matches!(result, Err(NodeError::JsError(_))));
    }

    #[test]
    fn test_eval_result_deserializes_defaults() {
        let result: JsEvalResult = serde_json::from_str("{}").unwrap();
        assert!(result.written_vars.is_empty());
        assert!(result.error.is_none());

        let result: JsEvalResult =
            serde_json::from_str(r#"{"written_vars": {"x": 1}, "error": null}"#).unwrap();
        assert_eq!(result.written_vars.get("x"), Some(&serde_json::json!(1)));
    }
}
