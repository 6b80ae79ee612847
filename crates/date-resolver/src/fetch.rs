//! Fetching of historical preview pages.

use async_trait::async_trait;
use sitedate_common::{Error, Result};
use tracing::debug;

/// Access to the pages served from a deploy's snapshot URL.
#[async_trait]
pub trait PreviewFetcher: Send + Sync {
    /// Fetch a preview page.
    ///
    /// Returns `Ok(None)` when the deploy never served the page ("not
    /// found" is a recognized state, not an error); any other failure is
    /// fatal for the run.
    async fn fetch(&self, url: &str) -> Result<Option<Vec<u8>>>;
}

/// Plain HTTP GET against the deploy's snapshot, binary body.
pub struct HttpPreviewFetcher {
    client: reqwest::Client,
}

impl HttpPreviewFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpPreviewFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PreviewFetcher for HttpPreviewFetcher {
    async fn fetch(&self, url: &str) -> Result<Option<Vec<u8>>> {
        debug!("Fetching preview: {}", url);

        let response = self.client.get(url).send().await.map_err(|e| Error::Transport {
            url: url.to_string(),
            source: e.into(),
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Error::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| Error::Transport {
            url: url.to_string(),
            source: e.into(),
        })?;

        Ok(Some(body.to_vec()))
    }
}
