//! In-memory and durable backings for the preview cache.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use sitedate_common::Result;
use tracing::{debug, warn};

use crate::entry::{CacheEntry, StoredEntry};

/// Namespace under the cache directory: package identity plus a constant
/// segment for preview data.
const NAMESPACE: &str = "sitedate/preview";

/// Cache of fetched preview responses, keyed by the literal URL.
///
/// Ephemeral by default; when opened over a directory, `save()` flushes one
/// JSON document per entry under `{dir}/sitedate/preview/`. The cache is not
/// auto-flushed on every `set`; callers invoke `save()` once at the end of
/// a resolution run.
pub struct PreviewCache {
    entries: HashMap<String, CacheEntry>,
    root: Option<PathBuf>,
    dirty: HashSet<String>,
    removed: HashSet<String>,
}

impl PreviewCache {
    /// Create a process-scoped cache with no durable backing.
    pub fn in_memory() -> Self {
        Self {
            entries: HashMap::new(),
            root: None,
            dirty: HashSet::new(),
            removed: HashSet::new(),
        }
    }

    /// Open a durable cache scoped to `dir`, loading any previously saved
    /// entries. Entries that fail to decode are skipped: a corrupt document
    /// is just a cache miss, never an error.
    pub fn durable(dir: impl AsRef<Path>) -> Result<Self> {
        let root = dir.as_ref().join(NAMESPACE);
        fs::create_dir_all(&root)?;

        let mut entries = HashMap::new();
        for dir_entry in fs::read_dir(&root)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_entry(&path) {
                Ok((url, entry)) => {
                    entries.insert(url, entry);
                }
                Err(reason) => {
                    warn!("Ignoring corrupt cache entry {}: {}", path.display(), reason);
                }
            }
        }

        debug!("Loaded {} cached preview(s) from {}", entries.len(), root.display());

        Ok(Self {
            entries,
            root: Some(root),
            dirty: HashSet::new(),
            removed: HashSet::new(),
        })
    }

    /// Look up the captured response for a preview URL.
    pub fn get(&self, url: &str) -> Option<&CacheEntry> {
        self.entries.get(url)
    }

    /// Record a captured response. Last writer wins; values for a given URL
    /// are immutable in practice since historical pages never change.
    pub fn set(&mut self, url: impl Into<String>, entry: CacheEntry) {
        let url = url.into();
        self.removed.remove(&url);
        self.dirty.insert(url.clone());
        self.entries.insert(url, entry);
    }

    /// Drop a single entry.
    pub fn delete(&mut self, url: &str) {
        if self.entries.remove(url).is_some() {
            self.dirty.remove(url);
            self.removed.insert(url.to_string());
        }
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        for url in self.entries.keys() {
            self.removed.insert(url.clone());
        }
        self.entries.clear();
        self.dirty.clear();
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flush pending writes and deletions to the durable store. A no-op for
    /// in-memory caches.
    pub fn save(&mut self) -> Result<()> {
        let Some(root) = &self.root else {
            return Ok(());
        };

        for url in self.removed.drain() {
            let path = entry_path(root, &url);
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }

        let mut written = 0usize;
        for url in self.dirty.drain() {
            let Some(entry) = self.entries.get(&url) else {
                continue;
            };
            let stored = StoredEntry::new(&url, entry);
            let json = serde_json::to_vec_pretty(&stored)?;
            fs::write(entry_path(root, &url), json)?;
            written += 1;
        }

        debug!("Saved {} preview cache entries to {}", written, root.display());

        Ok(())
    }
}

fn entry_path(root: &Path, url: &str) -> PathBuf {
    let digest = Sha256::digest(url.as_bytes());
    root.join(format!("{}.json", hex::encode(digest)))
}

fn load_entry(path: &Path) -> std::result::Result<(String, CacheEntry), String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    let stored: StoredEntry = serde_json::from_slice(&bytes).map_err(|e| e.to_string())?;
    let entry = stored.decode()?;
    Ok((stored.url, entry))
}
