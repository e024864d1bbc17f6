//! Postman collection v2 exporter.

use serde_json::{json, Value};

use super::{url_with_query, ExportRequest};

const SCHEMA: &str = "https://schema.getpostman.com/json/collection/v2.1.0/collection.json";

/// Render a set of requests as one Postman collection.
pub fn to_postman(name: &str, requests: &[ExportRequest]) -> Value {
    json!({
        "info": {
            "name": name,
            "schema": SCHEMA,
        },
        "item": requests.iter().map(item).collect::<Vec<_>>(),
    })
}

fn item(request: &ExportRequest) -> Value {
    let query: Vec<Value> = request
        .queries
        .iter()
        .map(|(key, value)| json!({ "key": key, "value": value }))
        .collect();
    let header: Vec<Value> = request
        .headers
        .iter()
        .map(|(key, value)| json!({ "key": key, "value": value }))
        .collect();

    let mut req = json!({
        "method": request.method,
        "url": {
            "raw": url_with_query(&request.url, &request.queries),
            "query": query,
        },
        "header": header,
    });

    if let Some(body) = body_value(request) {
        req["body"] = body;
    }

    json!({
        "name": request.name,
        "request": req,
    })
}

fn body_value(request: &ExportRequest) -> Option<Value> {
    if let Some(raw) = &request.body_raw {
        return Some(json!({
            "mode": "raw",
            "raw": String::from_utf8_lossy(raw),
        }));
    }
    if !request.body_urlencoded.is_empty() {
        return Some(json!({
            "mode": "urlencoded",
            "urlencoded": request
                .body_urlencoded
                .iter()
                .map(|(key, value)| json!({ "key": key, "value": value }))
                .collect::<Vec<_>>(),
        }));
    }
    if !request.body_form.is_empty() {
        return Some(json!({
            "mode": "formdata",
            "formdata": request
                .body_form
                .iter()
                .map(|(key, value)| json!({ "key": key, "value": value }))
                .collect::<Vec<_>>(),
        }));
    }
    None
}
