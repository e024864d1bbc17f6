//! HAR 1.2 importer.

use serde_json::Value;

use super::ImportedRequest;
use crate::error::{FlowError, FlowResult};

/// Parse a HAR log; one request per entry, with the recorded response kept
/// for dependency linking.
pub fn parse_har(text: &str) -> FlowResult<Vec<ImportedRequest>> {
    let doc: Value =
        serde_json::from_str(text).map_err(|e| FlowError::FlowFile(e.to_string()))?;
    let entries = doc
        .pointer("/log/entries")
        .and_then(Value::as_array)
        .ok_or_else(|| FlowError::FlowFile("har has no log.entries".to_string()))?;

    let mut requests = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        requests.push(parse_entry(index, entry)?);
    }
    Ok(requests)
}

fn parse_entry(index: usize, entry: &Value) -> FlowResult<ImportedRequest> {
    let request = entry
        .get("request")
        .ok_or_else(|| FlowError::FlowFile(format!("entry {index} has no request")))?;

    let method = request
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or("GET")
        .to_string();
    let full_url = request
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| FlowError::FlowFile(format!("entry {index} has no url")))?;
    let (url, mut queries) = match full_url.split_once('?') {
        None => (full_url.to_string(), Vec::new()),
        Some((base, query)) => (
            base.to_string(),
            query
                .split('&')
                .filter(|p| !p.is_empty())
                .map(|pair| {
                    let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                    (key.to_string(), value.to_string())
                })
                .collect(),
        ),
    };
    if let Some(rows) = request.get("queryString").and_then(Value::as_array) {
        if !rows.is_empty() {
            queries = name_value_rows(rows);
        }
    }

    let name = url
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(|segment| format!("{segment}_{index}"))
        .unwrap_or_else(|| format!("entry_{index}"));

    let mut imported = ImportedRequest {
        name,
        method,
        url,
        queries,
        headers: request
            .get("headers")
            .and_then(Value::as_array)
            .map(|rows| name_value_rows(rows))
            .unwrap_or_default(),
        ..Default::default()
    };

    if let Some(text) = request.pointer("/postData/text").and_then(Value::as_str) {
        imported.body = Some(text.as_bytes().to_vec());
    }

    if let Some(response) = entry.get("response") {
        imported.response_status = response
            .get("status")
            .and_then(Value::as_u64)
            .map(|s| s as u16);
        if let Some(text) = response.pointer("/content/text").and_then(Value::as_str) {
            imported.response_body = Some(text.as_bytes().to_vec());
        }
    }

    Ok(imported)
}

fn name_value_rows(rows: &[Value]) -> Vec<(String, String)> {
    rows.iter()
        .filter_map(|row| {
            let name = row.get("name").and_then(Value::as_str)?;
            let value = row.get("value").and_then(Value::as_str).unwrap_or("");
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "log": {
            "version": "1.2",
            "entries": [
                {
                    "request": {
                        "method": "POST",
                        "url": "http://svc/login",
                        "headers": [{"name": "Content-Type", "value": "application/json"}],
                        "postData": {"text": "{\"user\":\"a\"}"}
                    },
                    "response": {
                        "status": 200,
                        "content": {"text": "{\"token\":\"T-1\"}"}
                    }
                },
                {
                    "request": {
                        "method": "GET",
                        "url": "http://svc/me?full=1",
                        "headers": [{"name": "Authorization", "value": "Bearer T-1"}]
                    },
                    "response": {"status": 200, "content": {}}
                }
            ]
        }
    }"#;

    #[test]
    fn test_parse_entries() {
        let requests = parse_har(SAMPLE).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].response_status, Some(200));
        assert_eq!(
            requests[0].response_body.as_deref(),
            Some(br#"{"token":"T-1"}"#.as_slice())
        );
        assert_eq!(requests[1].url, "http://svc/me");
        assert_eq!(requests[1].queries, vec![("full".to_string(), "1".to_string())]);
    }

    #[test]
    fn test_har_linking_end_to_end() {
        use crate::ident::FakeIdSource;
        let requests = parse_har(SAMPLE).unwrap();
        let mut requests = requests;
        let ids = FakeIdSource::new();
        super::super::link_dependencies(&ids, &mut requests).unwrap();

        // the second entry consumes the first entry's token
        assert!(requests[1].headers[0].1.contains("response.body.token"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_har("{}").is_err());
        assert!(parse_har("nope").is_err());
    }
}
