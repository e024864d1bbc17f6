//! Postman collection v2 importer.

use serde_json::Value;

use super::ImportedRequest;
use crate::error::{FlowError, FlowResult};

/// Parse a Postman collection v2 document; nested folders are flattened in
/// document order.
pub fn parse_postman(text: &str) -> FlowResult<Vec<ImportedRequest>> {
    let doc: Value =
        serde_json::from_str(text).map_err(|e| FlowError::FlowFile(e.to_string()))?;
    let items = doc
        .get("item")
        .and_then(Value::as_array)
        .ok_or_else(|| FlowError::FlowFile("collection has no item array".to_string()))?;

    let mut requests = Vec::new();
    collect_items(items, &mut requests)?;
    Ok(requests)
}

fn collect_items(items: &[Value], out: &mut Vec<ImportedRequest>) -> FlowResult<()> {
    for item in items {
        if let Some(children) = item.get("item").and_then(Value::as_array) {
            collect_items(children, out)?;
            continue;
        }
        if let Some(request) = item.get("request") {
            out.push(parse_item(item, request)?);
        }
    }
    Ok(())
}

fn parse_item(item: &Value, request: &Value) -> FlowResult<ImportedRequest> {
    let name = item
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("imported")
        .to_string();
    let method = request
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or("GET")
        .to_string();

    let (url, queries) = parse_url(request.get("url"))?;

    let headers = request
        .get("header")
        .and_then(Value::as_array)
        .map(|rows| key_value_rows(rows))
        .unwrap_or_default();

    let mut imported = ImportedRequest {
        name,
        method,
        url,
        headers,
        queries,
        ..Default::default()
    };

    if let Some(body) = request.get("body") {
        match body.get("mode").and_then(Value::as_str) {
            Some("raw") => {
                if let Some(raw) = body.get("raw").and_then(Value::as_str) {
                    imported.body = Some(raw.as_bytes().to_vec());
                }
            }
            Some("urlencoded") => {
                if let Some(rows) = body.get("urlencoded").and_then(Value::as_array) {
                    imported.body_urlencoded = key_value_rows(rows);
                }
            }
            Some("formdata") => {
                if let Some(rows) = body.get("formdata").and_then(Value::as_array) {
                    imported.body_urlencoded = key_value_rows(rows);
                }
            }
            _ => {}
        }
    }

    Ok(imported)
}

fn parse_url(url: Option<&Value>) -> FlowResult<(String, Vec<(String, String)>)> {
    let url = url.ok_or_else(|| FlowError::FlowFile("item request has no url".to_string()))?;
    match url {
        Value::String(raw) => Ok(split_raw_url(raw)),
        Value::Object(map) => {
            let queries = map
                .get("query")
                .and_then(Value::as_array)
                .map(|rows| key_value_rows(rows))
                .unwrap_or_default();
            let raw = map
                .get("raw")
                .and_then(Value::as_str)
                .ok_or_else(|| FlowError::FlowFile("url object has no raw field".to_string()))?;
            let (base, inline) = split_raw_url(raw);
            // the query array is authoritative when present
            let queries = if queries.is_empty() { inline } else { queries };
            Ok((base, queries))
        }
        _ => Err(FlowError::FlowFile("unsupported url shape".to_string())),
    }
}

fn split_raw_url(raw: &str) -> (String, Vec<(String, String)>) {
    match raw.split_once('?') {
        None => (raw.to_string(), Vec::new()),
        Some((base, query)) => {
            let queries = query
                .split('&')
                .filter(|p| !p.is_empty())
                .map(|pair| {
                    let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                    (key.to_string(), value.to_string())
                })
                .collect();
            (base.to_string(), queries)
        }
    }
}

fn key_value_rows(rows: &[Value]) -> Vec<(String, String)> {
    rows.iter()
        .filter_map(|row| {
            let key = row.get("key").and_then(Value::as_str)?;
            let value = row.get("value").and_then(Value::as_str).unwrap_or("");
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}
