//! Client for the hosting provider's deploy-list API.

use async_trait::async_trait;
use sitedate_common::{Error, Result};
use tracing::{debug, warn};

use crate::pagination::parse_link_header;

/// One page of the deploy-list endpoint.
#[derive(Debug, Clone, Default)]
pub struct PageResponse {
    /// Raw deploy records, prior to validation.
    pub records: Vec<serde_json::Value>,
    /// URL of the next page, when one exists.
    pub next: Option<String>,
    /// URL of the last page, when the header reports one.
    pub last: Option<String>,
}

/// Access to the paginated deploy-list endpoint.
#[async_trait]
pub trait DeployApi: Send + Sync {
    /// Fetch a single page of deploy records.
    async fn fetch_page(&self, url: &str) -> Result<PageResponse>;
}

/// HTTP implementation against a hosting provider's REST API.
pub struct HttpDeployApi {
    client: reqwest::Client,
    access_token: Option<String>,
}

impl HttpDeployApi {
    /// Create a new client, optionally sending a bearer token with each request.
    pub fn new(access_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token,
        }
    }
}

#[async_trait]
impl DeployApi for HttpDeployApi {
    async fn fetch_page(&self, url: &str) -> Result<PageResponse> {
        debug!("Fetching deploy list page: {}", url);

        let mut request = self.client.get(url);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| Error::Transport {
            url: url.to_string(),
            source: e.into(),
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            warn!("Deploy list at {} returned 404, treating as empty page", url);
            return Ok(PageResponse::default());
        }
        if !status.is_success() {
            return Err(Error::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let links = response
            .headers()
            .get(reqwest::header::LINK)
            .and_then(|value| value.to_str().ok())
            .map(parse_link_header)
            .unwrap_or_default();

        let body: serde_json::Value = response.json().await.map_err(|e| Error::Transport {
            url: url.to_string(),
            source: e.into(),
        })?;

        match body {
            serde_json::Value::Array(records) => Ok(PageResponse {
                records,
                next: links.next,
                last: links.last,
            }),
            other => {
                // A non-array body carries no records and no pagination
                // signal, so the scan loop can terminate on it.
                warn!(
                    "Deploy list at {} returned non-array body ({}), treating as empty page",
                    url,
                    json_type_name(&other)
                );
                Ok(PageResponse::default())
            }
        }
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
