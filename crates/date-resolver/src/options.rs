//! Caller-supplied options: the hooks the engine calls at defined points.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// One build-output file: rendered contents plus caller-visible metadata.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FileEntry {
    pub contents: Vec<u8>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl FileEntry {
    pub fn new(contents: impl Into<Vec<u8>>) -> Self {
        Self {
            contents: contents.into(),
            metadata: BTreeMap::new(),
        }
    }
}

/// The build's file map. A `BTreeMap` gives deterministic enumeration order
/// and value semantics, so `clone()` hands collaborators a true deep copy.
pub type FileMap = BTreeMap<String, FileEntry>;

/// Maps a build filename to the URL path it is served under.
pub type FilenameToUrlPath = Arc<dyn Fn(&str) -> anyhow::Result<String> + Send + Sync>;

/// Normalizes a byte payload before comparison (e.g. strips volatile markup).
pub type ContentsConverter = Arc<dyn Fn(&[u8]) -> anyhow::Result<Vec<u8>> + Send + Sync>;

/// Decides whether two converted payloads represent the same rendered content.
pub type ContentsEquals = Arc<dyn Fn(&[u8], &[u8]) -> anyhow::Result<bool> + Send + Sync>;

/// Folds preview-derived metadata into a file entry before a comparison
/// rebuild, so output that embeds its own dates can still compare equal.
pub type MetadataUpdater = Arc<dyn Fn(&[u8], &mut FileEntry) -> anyhow::Result<()> + Send + Sync>;

/// Options bundle for a resolution run.
///
/// Hook failures are fatal for the run and are surfaced naming the option
/// and the file that triggered them.
#[derive(Clone)]
pub struct Options {
    /// Path inserted between each deploy's root URL and a page's URL path.
    pub root_path: String,
    /// Overrides the run's "now" used as the default for unresolved cells.
    pub default_date: Option<DateTime<Utc>>,
    pub filename_to_url_path: FilenameToUrlPath,
    pub contents_converter: ContentsConverter,
    pub contents_equals: ContentsEquals,
    pub metadata_updater: MetadataUpdater,
}

impl Options {
    /// Defaults: filenames are URL paths as-is, contents compare byte for
    /// byte, metadata is left untouched.
    pub fn new() -> Self {
        Self {
            root_path: String::new(),
            default_date: None,
            filename_to_url_path: Arc::new(|filename: &str| Ok(filename.to_string())),
            contents_converter: Arc::new(|contents: &[u8]| Ok(contents.to_vec())),
            contents_equals: Arc::new(|a: &[u8], b: &[u8]| Ok(a == b)),
            metadata_updater: Arc::new(|_preview: &[u8], _entry: &mut FileEntry| Ok(())),
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}
