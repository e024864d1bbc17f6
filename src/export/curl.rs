//! curl command exporter: one single-line command per request.

use super::{url_with_query, ExportRequest};

/// Render as a single-line `curl` invocation.
pub fn to_curl(request: &ExportRequest) -> String {
    let mut parts = vec!["curl".to_string()];

    if !request.method.is_empty() && request.method != "GET" {
        parts.push("--request".to_string());
        parts.push(request.method.clone());
    }

    parts.push(quote(&url_with_query(&request.url, &request.queries)));

    for (key, value) in &request.headers {
        parts.push("-H".to_string());
        parts.push(quote(&format!("{key}: {value}")));
    }

    for (key, value) in &request.body_urlencoded {
        parts.push("--data-urlencode".to_string());
        parts.push(quote(&format!("{key}={value}")));
    }

    for (key, value) in &request.body_form {
        parts.push("--form".to_string());
        parts.push(quote(&format!("{key}={value}")));
    }

    if let Some(body) = &request.body_raw {
        match std::str::from_utf8(body) {
            Ok(text) => {
                parts.push("--data".to_string());
                parts.push(quote(text));
            }
            Err(_) => {
                parts.push("--data-binary".to_string());
                parts.push(quote("@body.bin"));
            }
        }
    }

    parts.join(" ")
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}
