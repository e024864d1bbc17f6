//! Serde schema of the YAML flow file.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Top-level flow file.
#[derive(Debug, Clone, Deserialize)]
pub struct FlowFile {
    #[serde(default)]
    pub workspace_name: Option<String>,
    /// Ordered run list with inter-flow dependencies; absent means every
    /// flow runs once in file order.
    #[serde(default)]
    pub run: Option<Vec<RunEntry>>,
    pub flows: Vec<FlowDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunEntry {
    pub flow: String,
    #[serde(default, deserialize_with = "string_or_seq")]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlowDef {
    pub name: String,
    #[serde(default)]
    pub variables: Vec<VariableDef>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariableDef {
    pub name: String,
    pub value: Value,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// One step; exactly one of the kind keys is expected.
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub request: Option<RequestStep>,
    #[serde(default, rename = "if")]
    pub if_step: Option<IfStep>,
    #[serde(default, rename = "for")]
    pub for_step: Option<ForStep>,
    #[serde(default)]
    pub foreach: Option<ForEachStep>,
    #[serde(default)]
    pub js: Option<JsStep>,
    #[serde(default, deserialize_with = "string_or_seq")]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestStep {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub query_params: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub asserts: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IfStep {
    #[serde(default)]
    pub name: Option<String>,
    pub condition: String,
    #[serde(default)]
    pub then: Vec<Step>,
    #[serde(default, rename = "else")]
    pub else_steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForStep {
    #[serde(default)]
    pub name: Option<String>,
    pub count: i64,
    #[serde(default)]
    pub error_handling: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForEachStep {
    #[serde(default)]
    pub name: Option<String>,
    pub items: String,
    #[serde(default)]
    pub break_if: Option<String>,
    #[serde(default)]
    pub error_handling: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsStep {
    #[serde(default)]
    pub name: Option<String>,
    pub code: String,
}

/// `depends_on` accepts a single name or a sequence of names.
fn string_or_seq<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(de)? {
        OneOrMany::One(one) => vec![one],
        OneOrMany::Many(many) => many,
    })
}
