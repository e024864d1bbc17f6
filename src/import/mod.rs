//! Importers: curl, Postman collection v2, HAR 1.2.
//!
//! Each importer is a pure translator into [`ImportedRequest`] values;
//! [`materialize_imports`] writes those into the data model and, for
//! imports that carry responses, runs the dependency finder so requests
//! consuming earlier responses become `{{ }}` references.

mod curl;
mod har;
mod postman;

pub use curl::parse_curl;
pub use har::parse_har;
pub use postman::parse_postman;

use crate::depfind::{DependencyFinder, Producer};
use crate::error::{FlowError, FlowResult};
use crate::ident::{Id, IdSource};
use crate::model::{HttpBodyRaw, HttpKv, HttpRequestDef, KvKind};
use crate::repo::Repository;

/// One request produced by an importer, with the exchange's response when
/// the source format carries one (HAR).
#[derive(Debug, Clone, Default)]
pub struct ImportedRequest {
    pub name: String,
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub queries: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub body_urlencoded: Vec<(String, String)>,
    pub response_status: Option<u16>,
    pub response_body: Option<Vec<u8>>,
}

/// Write imported requests into the repository. With `link` set, scalar
/// values matching an earlier response are rewritten to `{{ }}` template
/// references before storage.
pub async fn materialize_imports(
    repo: &dyn Repository,
    ids: &dyn IdSource,
    workspace_id: Id,
    mut requests: Vec<ImportedRequest>,
    link: bool,
) -> FlowResult<Vec<Id>> {
    if link {
        link_dependencies(ids, &mut requests)?;
    }

    let mut created = Vec::with_capacity(requests.len());
    for request in requests {
        let def_id = ids.next_id();
        repo.create_request_def(HttpRequestDef {
            id: def_id,
            workspace_id,
            name: request.name.clone(),
            method: request.method.clone(),
            url: request.url.clone(),
        })
        .await?;

        for (kind, pairs) in [
            (KvKind::Header, &request.headers),
            (KvKind::Query, &request.queries),
            (KvKind::BodyUrlencoded, &request.body_urlencoded),
        ] {
            for (key, value) in pairs {
                repo.create_kv(HttpKv {
                    id: ids.next_id(),
                    http_id: def_id,
                    kind,
                    key: key.clone(),
                    value: value.clone(),
                    enabled: true,
                    delta_parent_id: None,
                    prev_id: None,
                    next_id: None,
                })
                .await?;
            }
        }

        if let Some(body) = &request.body {
            repo.set_body_raw(HttpBodyRaw {
                id: ids.next_id(),
                http_id: def_id,
                data: body.clone(),
                compress_kind: Default::default(),
            })
            .await?;
        }

        created.push(def_id);
    }
    Ok(created)
}

/// Walk the requests in order, indexing each response and rewriting later
/// requests that reuse its values.
fn link_dependencies(ids: &dyn IdSource, requests: &mut [ImportedRequest]) -> FlowResult<()> {
    let mut finder = DependencyFinder::new();

    for request in requests.iter_mut() {
        // consume: rewrite matches against everything indexed so far
        let (url, _, _) = finder.replace_url_path(&request.url);
        request.url = url;

        for (_, value) in request.headers.iter_mut() {
            *value = replace_header_value(&finder, value);
        }
        for (_, value) in request.queries.iter_mut() {
            if let Some(producer) = finder.find(value) {
                *value = format!("{{{{ {} }}}}", producer.path);
            }
        }
        if let Some(body) = &request.body {
            if serde_json::from_slice::<serde_json::Value>(body).is_ok() {
                let templated = finder
                    .template_json(body)
                    .map_err(|e| FlowError::FlowFile(e.to_string()))?;
                if templated.any_found {
                    request.body = Some(templated.bytes);
                }
            }
        }

        // produce: index this exchange's response for later requests
        if let Some(response_body) = &request.response_body {
            if serde_json::from_slice::<serde_json::Value>(response_body).is_ok() {
                let producer = Producer {
                    path: format!("{}.response.body", request.name),
                    node_id: ids.next_id(),
                };
                finder
                    .add_json(response_body, producer)
                    .map_err(|e| FlowError::FlowFile(e.to_string()))?;
            }
        }
    }
    Ok(())
}

/// Header values often embed a produced value after a scheme word
/// (`Bearer <token>`); check the exact value first, then each token.
fn replace_header_value(finder: &DependencyFinder, value: &str) -> String {
    if let Some(producer) = finder.find(value) {
        return format!("{{{{ {} }}}}", producer.path);
    }
    let mut replaced = false;
    let rewritten: Vec<String> = value
        .split(' ')
        .map(|token| match finder.find(token) {
            Some(producer) => {
                replaced = true;
                format!("{{{{ {} }}}}", producer.path)
            }
            None => token.to_string(),
        })
        .collect();
    if replaced {
        rewritten.join(" ")
    } else {
        value.to_string()
    }
}
