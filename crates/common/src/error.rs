use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("unexpected response status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("option `{option}` failed for file {filename}: {source}")]
    Hook {
        option: &'static str,
        filename: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("build pipeline failed: {0}")]
    Pipeline(#[source] anyhow::Error),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
