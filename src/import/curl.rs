//! curl command importer.

use super::ImportedRequest;
use crate::error::{FlowError, FlowResult};

/// Parse a curl command line into a request. Supports the flags the
/// exporter produces: `-X/--request`, `-H/--header`, `--data/-d`,
/// `--data-urlencode`, `--data-binary`, `--form/-F`, `--url`.
pub fn parse_curl(command: &str) -> FlowResult<ImportedRequest> {
    let tokens = shell_split(command)?;
    let mut iter = tokens.into_iter().peekable();

    match iter.next().as_deref() {
        Some("curl") => {}
        _ => return Err(FlowError::FlowFile("not a curl command".to_string())),
    }

    let mut request = ImportedRequest {
        name: "imported".to_string(),
        method: "GET".to_string(),
        ..Default::default()
    };
    let mut method_explicit = false;
    let mut has_body = false;

    while let Some(token) = iter.next() {
        match token.as_str() {
            "-X" | "--request" => {
                request.method = expect_value(&mut iter, &token)?;
                method_explicit = true;
            }
            "-H" | "--header" => {
                let header = expect_value(&mut iter, &token)?;
                let (key, value) = header
                    .split_once(':')
                    .ok_or_else(|| FlowError::FlowFile(format!("bad header: {header}")))?;
                request
                    .headers
                    .push((key.trim().to_string(), value.trim().to_string()));
            }
            "-d" | "--data" | "--data-raw" | "--data-binary" => {
                let data = expect_value(&mut iter, &token)?;
                request.body = Some(data.into_bytes());
                has_body = true;
            }
            "--data-urlencode" => {
                let data = expect_value(&mut iter, &token)?;
                let (key, value) = data.split_once('=').unwrap_or((data.as_str(), ""));
                request
                    .body_urlencoded
                    .push((key.to_string(), value.to_string()));
                has_body = true;
            }
            "-F" | "--form" => {
                let data = expect_value(&mut iter, &token)?;
                let (key, value) = data.split_once('=').unwrap_or((data.as_str(), ""));
                request
                    .headers
                    .push(("Content-Type".to_string(), "multipart/form-data".to_string()));
                request
                    .body_urlencoded
                    .push((key.to_string(), value.to_string()));
                has_body = true;
            }
            "--url" => request.url = expect_value(&mut iter, &token)?,
            "-G" | "--get" => request.method = "GET".to_string(),
            // flags without a value we deliberately ignore
            "-s" | "--silent" | "-k" | "--insecure" | "-L" | "--location" | "--compressed" => {}
            other if other.starts_with('-') => {
                // unknown option: skip its value when one follows
                if iter.peek().map(|next| !next.starts_with('-')).unwrap_or(false) {
                    iter.next();
                }
            }
            _ => request.url = token,
        }
    }

    if request.url.is_empty() {
        return Err(FlowError::FlowFile("curl command has no URL".to_string()));
    }
    if has_body && !method_explicit {
        request.method = "POST".to_string();
    }

    // split an inline query string into rows
    let full_url = request.url.clone();
    if let Some((base, query)) = full_url.split_once('?') {
        request.url = base.to_string();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            request.queries.push((key.to_string(), value.to_string()));
        }
    }

    Ok(request)
}

fn expect_value(
    iter: &mut std::iter::Peekable<std::vec::IntoIter<String>>,
    flag: &str,
) -> FlowResult<String> {
    iter.next()
        .ok_or_else(|| FlowError::FlowFile(format!("flag {flag} is missing its value")))
}

/// Minimal shell-style splitter: whitespace-separated, single and double
/// quotes, backslash escapes outside single quotes.
fn shell_split(input: &str) -> FlowResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();
    let mut in_token = false;

    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' | '\n' => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            '\'' => {
                in_token = true;
                for inner in chars.by_ref() {
                    if inner == '\'' {
                        break;
                    }
                    current.push(inner);
                }
            }
            '"' => {
                in_token = true;
                while let Some(inner) = chars.next() {
                    match inner {
                        '"' => break,
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                current.push(escaped);
                            }
                        }
                        _ => current.push(inner),
                    }
                }
            }
            '\\' => match chars.next() {
                // backslash-newline is a line continuation
                Some('\n') | None => {}
                Some(escaped) => {
                    in_token = true;
                    current.push(escaped);
                }
            },
            _ => {
                in_token = true;
                current.push(c);
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    if tokens.is_empty() {
        return Err(FlowError::FlowFile("empty command".to_string()));
    }
    Ok(tokens)
}
