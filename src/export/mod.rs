//! Exporters: curl, Postman collection v2, HAR 1.2.
//!
//! All three are pure translators over a loaded request view; the CLI
//! resolves ids through the repository and hands the loaded view here.

mod curl;
mod har;
mod postman;

pub use curl::to_curl;
pub use har::to_har;
pub use postman::to_postman;

use crate::error::FlowResult;
use crate::ident::Id;
use crate::model::{HttpResponseRecord, KvKind};
use crate::repo::Repository;

/// A request template loaded for export.
#[derive(Debug, Clone, Default)]
pub struct ExportRequest {
    pub name: String,
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub queries: Vec<(String, String)>,
    pub body_raw: Option<Vec<u8>>,
    pub body_urlencoded: Vec<(String, String)>,
    pub body_form: Vec<(String, String)>,
}

/// Load one request template with its ordered collections.
pub async fn load_export_request(repo: &dyn Repository, id: Id) -> FlowResult<ExportRequest> {
    let def = repo.get_request_def(id).await?;
    let kv_pairs = |rows: Vec<crate::model::HttpKv>| {
        rows.into_iter()
            .filter(|r| r.enabled)
            .map(|r| (r.key, r.value))
            .collect::<Vec<_>>()
    };
    Ok(ExportRequest {
        name: def.name,
        method: def.method,
        url: def.url,
        headers: kv_pairs(repo.list_kv(id, KvKind::Header).await?),
        queries: kv_pairs(repo.list_kv(id, KvKind::Query).await?),
        body_raw: repo.get_body_raw(id).await?.map(|b| b.data),
        body_urlencoded: kv_pairs(repo.list_kv(id, KvKind::BodyUrlencoded).await?),
        body_form: kv_pairs(repo.list_kv(id, KvKind::BodyForm).await?),
    })
}

/// Load the stored exchanges of a request for HAR export.
pub async fn load_export_responses(
    repo: &dyn Repository,
    id: Id,
) -> FlowResult<Vec<HttpResponseRecord>> {
    Ok(repo.list_responses(id).await?)
}

/// Append the query parameters to the URL, percent-encoded.
pub(crate) fn url_with_query(raw_url: &str, queries: &[(String, String)]) -> String {
    if queries.is_empty() {
        return raw_url.to_string();
    }
    match url::Url::parse(raw_url) {
        Ok(mut parsed) => {
            for (key, value) in queries {
                parsed.query_pairs_mut().append_pair(key, value);
            }
            parsed.to_string()
        }
        Err(_) => {
            // templated URLs do not always parse; append naively
            let sep = if raw_url.contains('?') { '&' } else { '?' };
            let encoded: Vec<String> = queries
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            format!("{raw_url}{sep}{}", encoded.join("&"))
        }
    }
}
