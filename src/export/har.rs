//! HAR 1.2 exporter.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::{url_with_query, ExportRequest};
use crate::model::HttpResponseRecord;

const CREATOR_NAME: &str = "devtools";

/// Render requests (with any stored exchanges) as a HAR 1.2 log.
pub fn to_har(pairs: &[(ExportRequest, Option<HttpResponseRecord>)]) -> Value {
    json!({
        "log": {
            "version": "1.2",
            "creator": {
                "name": CREATOR_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
            "entries": pairs.iter().map(|(req, resp)| entry(req, resp.as_ref())).collect::<Vec<_>>(),
        }
    })
}

fn entry(request: &ExportRequest, response: Option<&HttpResponseRecord>) -> Value {
    let started: DateTime<Utc> = response.map(|r| r.time).unwrap_or_else(Utc::now);
    json!({
        "startedDateTime": started.to_rfc3339(),
        "time": response.map(|r| r.duration_ms).unwrap_or(0),
        "request": {
            "method": request.method,
            "url": url_with_query(&request.url, &request.queries),
            "httpVersion": "HTTP/1.1",
            "headers": name_value(&request.headers),
            "queryString": name_value(&request.queries),
            "postData": post_data(request),
            "headersSize": -1,
            "bodySize": -1,
        },
        "response": {
            "status": response.map(|r| r.status).unwrap_or(0),
            "statusText": "",
            "httpVersion": "HTTP/1.1",
            "headers": response.map(|r| name_value(&r.headers)).unwrap_or_else(|| json!([])),
            "content": {
                "size": response.map(|r| r.size).unwrap_or(0),
                "text": response
                    .map(|r| String::from_utf8_lossy(&r.body).into_owned())
                    .unwrap_or_default(),
            },
            "headersSize": -1,
            "bodySize": -1,
        },
    })
}

fn name_value(pairs: &[(String, String)]) -> Value {
    Value::Array(
        pairs
            .iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect(),
    )
}

fn post_data(request: &ExportRequest) -> Value {
    if let Some(raw) = &request.body_raw {
        return json!({
            "mimeType": "application/json",
            "text": String::from_utf8_lossy(raw),
        });
    }
    if !request.body_urlencoded.is_empty() {
        return json!({
            "mimeType": "application/x-www-form-urlencoded",
            "params": name_value(&request.body_urlencoded),
        });
    }
    Value::Null
}
