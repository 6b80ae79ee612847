//! Deploy records returned by the hosting provider's deploy-list API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single historical deploy of a site.
///
/// Field names follow the wire format of the deploy-list endpoint. A deploy
/// is immutable once returned; only deploys with `state == "ready"` take
/// part in date resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deploy {
    pub id: String,
    pub state: String,
    pub name: String,
    #[serde(default)]
    pub commit_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    pub deploy_ssl_url: String,
}

impl Deploy {
    /// Whether this deploy finished and is being served.
    pub fn is_ready(&self) -> bool {
        self.state == "ready"
    }

    /// The timestamp a page served from this deploy is attributed to.
    ///
    /// Falls back to `created_at` for deploys the provider never marked
    /// published.
    pub fn published_date(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.created_at)
    }

    /// The dereferenceable root URL of this deploy's snapshot.
    ///
    /// Providers sometimes report a `deploy_ssl_url` whose embedded deploy-id
    /// host segment does not match `id`. The id segment is rewritten to `id`,
    /// but only when the embedded name segment matches `name`, so an
    /// unrelated URL shape is never rewritten.
    pub fn absolute_url(&self) -> String {
        let Some((scheme, rest)) = self.deploy_ssl_url.split_once("://") else {
            return self.deploy_ssl_url.clone();
        };

        let (host, path) = match rest.split_once('/') {
            Some((host, path)) => (host, Some(path)),
            None => (rest, None),
        };

        if let Some((_, tail)) = host.split_once("--") {
            let name_segment = tail.split('.').next().unwrap_or(tail);
            if name_segment == self.name {
                let mut url = format!("{}://{}--{}", scheme, self.id, tail);
                if let Some(path) = path {
                    url.push('/');
                    url.push_str(path);
                }
                return url;
            }
        }

        self.deploy_ssl_url.clone()
    }
}
