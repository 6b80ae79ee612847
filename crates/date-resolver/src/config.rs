//! Configuration management for date resolution.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::path::PathBuf;

use anyhow::Result;

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root URL of the hosting provider's REST API
    pub api_root: String,

    /// Site identifier on the hosting provider
    pub site_id: String,

    /// Bearer token for the deploy-list endpoint (optional; public sites
    /// can be listed without one)
    pub access_token: Option<String>,

    /// Directory for the durable preview cache; unset keeps the cache
    /// in-memory for the process lifetime
    pub cache_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenv::dotenv().ok();

        let config = Config {
            api_root: env::var("SITEDATE_API_ROOT")
                .unwrap_or_else(|_| "https://api.netlify.com/api/v1".to_string()),

            site_id: env::var("SITEDATE_SITE_ID").unwrap_or_default(),

            access_token: env::var("SITEDATE_ACCESS_TOKEN").ok(),

            cache_dir: env::var("SITEDATE_CACHE_DIR").ok().map(PathBuf::from),
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.site_id.is_empty() {
            anyhow::bail!("SITEDATE_SITE_ID is required");
        }

        if self.api_root.is_empty() {
            anyhow::bail!("SITEDATE_API_ROOT must not be empty");
        }

        Ok(())
    }
}
