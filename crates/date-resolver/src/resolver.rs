//! The deploy-scan orchestrator.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use deploy_history::{DeployHistory, DeploySource, HttpDeployApi};
use preview_cache::{CacheEntry, PreviewCache};
use sitedate_common::{Deploy, Error, Result};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::fetch::{HttpPreviewFetcher, PreviewFetcher};
use crate::options::{FileMap, Options};
use crate::pipeline::BuildPipeline;
use crate::state::{FileDates, ResolvedDates};

/// One target page: the build filename and the URL path it is served under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub filename: String,
    pub url_path: String,
}

/// The outcome of a resolution run.
#[derive(Debug)]
pub struct Resolution {
    /// Resolved date pair per target filename.
    pub dates: HashMap<String, ResolvedDates>,
    /// The real file set after the final pipeline run, with resolved dates
    /// stamped into each target's metadata.
    pub files: FileMap,
}

/// What the fetch stage learned about one file at one deploy.
struct Preview {
    /// `None` when the deploy never served the page.
    body: Option<Vec<u8>>,
    published: DateTime<Utc>,
}

/// Date-resolution engine.
///
/// Walks the deploy sequence newest to oldest, fetching each target's
/// historical preview through the cache and driving the per-file date cells
/// until every file is established or deploys are exhausted.
pub struct DateResolver {
    source: Arc<dyn DeploySource>,
    fetcher: Arc<dyn PreviewFetcher>,
    pipeline: Arc<dyn BuildPipeline>,
    cache: PreviewCache,
    options: Options,
}

impl DateResolver {
    pub fn new(
        source: Arc<dyn DeploySource>,
        fetcher: Arc<dyn PreviewFetcher>,
        pipeline: Arc<dyn BuildPipeline>,
        cache: PreviewCache,
        options: Options,
    ) -> Self {
        Self {
            source,
            fetcher,
            pipeline,
            cache,
            options,
        }
    }

    /// Wire up the production collaborators from configuration.
    ///
    /// The deploy list is restricted to `commit_hashes` when supplied; the
    /// cache is durable when the configuration names a cache directory.
    pub fn from_config(
        config: &Config,
        pipeline: Arc<dyn BuildPipeline>,
        commit_hashes: Option<HashSet<String>>,
        options: Options,
    ) -> Result<Self> {
        let api = Arc::new(HttpDeployApi::new(config.access_token.clone()));
        let source = Arc::new(DeployHistory::new(
            api,
            config.api_root.clone(),
            config.site_id.clone(),
            commit_hashes,
        ));
        let cache = match &config.cache_dir {
            Some(dir) => PreviewCache::durable(dir)?,
            None => PreviewCache::in_memory(),
        };

        Ok(Self::new(
            source,
            Arc::new(HttpPreviewFetcher::new()),
            pipeline,
            cache,
            options,
        ))
    }

    /// Resolve `{published, modified}` for every file in `files`.
    ///
    /// `now` is the default for cells no deploy ever resolves; a file never
    /// seen in any deploy receives it for both dates. After resolution the
    /// pipeline runs once over the real file set with the resolved dates
    /// stamped into metadata, and the cache is flushed.
    pub async fn resolve(&mut self, files: FileMap, now: DateTime<Utc>) -> Result<Resolution> {
        let default_date = self.options.default_date.unwrap_or(now);

        let deploys = self.source.deploys().await?;
        info!(
            "Resolving dates for {} file(s) across {} deploy(s)",
            files.len(),
            deploys.len()
        );

        let mut targets = self.targets_for(&files)?;
        let mut working = files.clone();
        let mut states: BTreeMap<String, FileDates> = BTreeMap::new();

        for deploy in &deploys {
            if targets.is_empty() {
                break;
            }

            let previews = self.fetch_stage(deploy, &targets).await?;

            // State updates happen in declared target order, only after the
            // whole batch has settled.
            let mut survivors = Vec::with_capacity(targets.len());
            for target in targets {
                let Some(preview) = previews.get(&target.filename) else {
                    continue;
                };
                let dates = states
                    .entry(target.filename.clone())
                    .or_insert_with(|| FileDates::new(default_date));

                if preview.body.is_some() {
                    dates.published.record(preview.published);
                    survivors.push(target);
                } else {
                    // The page did not exist at this deploy: the values from
                    // the previous, more recent iteration become final.
                    debug!(
                        "{} not found at deploy {}, dates established",
                        target.filename, deploy.id
                    );
                    dates.establish();
                    working.remove(&target.filename);
                }
            }
            targets = survivors;

            self.comparison_stage(&targets, &previews, &working, &mut states)
                .await?;

            let all_modified_established = states
                .values()
                .all(|dates| dates.modified.is_established());
            if all_modified_established {
                debug!("All modified dates established at deploy {}", deploy.id);
                break;
            }
        }

        let mut dates = HashMap::with_capacity(files.len());
        for (filename, file_dates) in &states {
            dates.insert(filename.clone(), file_dates.resolved());
        }
        for filename in files.keys() {
            dates.entry(filename.clone()).or_insert(ResolvedDates {
                published: default_date,
                modified: default_date,
            });
        }

        let files = self.finish(files, &dates).await?;
        self.cache.save()?;

        Ok(Resolution { dates, files })
    }

    /// Map build filenames to URL paths through the caller's hook.
    fn targets_for(&self, files: &FileMap) -> Result<Vec<Target>> {
        let mut targets = Vec::with_capacity(files.len());
        for filename in files.keys() {
            let url_path =
                (self.options.filename_to_url_path)(filename).map_err(|e| Error::Hook {
                    option: "filename_to_url_path",
                    filename: filename.clone(),
                    source: e,
                })?;
            targets.push(Target {
                filename: filename.clone(),
                url_path,
            });
        }
        Ok(targets)
    }

    /// Fetch every target's preview at one deploy, through the cache.
    ///
    /// Cache misses are fanned out concurrently; the batch is a barrier, and
    /// every response (404s included) is recorded in the cache before state
    /// updates run.
    async fn fetch_stage(
        &mut self,
        deploy: &Deploy,
        targets: &[Target],
    ) -> Result<HashMap<String, Preview>> {
        let deploy_root = deploy.absolute_url();
        let deploy_published = deploy.published_date();

        let mut previews = HashMap::with_capacity(targets.len());
        let mut misses = Vec::new();

        for target in targets {
            let url = join_url(&deploy_root, &self.options.root_path, &target.url_path);
            match self.cache.get(&url) {
                Some(entry) => {
                    previews.insert(
                        target.filename.clone(),
                        Preview {
                            body: entry.body.clone(),
                            published: parse_published_label(&entry.published)
                                .unwrap_or(deploy_published),
                        },
                    );
                }
                None => misses.push((target.filename.clone(), url)),
            }
        }

        let mut join_set = JoinSet::new();
        for (filename, url) in misses {
            let fetcher = Arc::clone(&self.fetcher);
            join_set.spawn(async move {
                let outcome = fetcher.fetch(&url).await;
                (filename, url, outcome)
            });
        }

        // Drain the whole batch before surfacing any failure, so no fetch is
        // left dangling into the next deploy.
        let mut fetched = Vec::new();
        let mut failure: Option<Error> = None;
        while let Some(joined) = join_set.join_next().await {
            let (filename, url, outcome) = joined
                .map_err(|e| Error::Other(anyhow::anyhow!("preview fetch task failed: {e}")))?;
            match outcome {
                Ok(body) => fetched.push((filename, url, body)),
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        for (filename, url, body) in fetched {
            self.cache.set(
                url,
                CacheEntry {
                    body: body.clone(),
                    published: deploy_published.to_rfc3339(),
                },
            );
            previews.insert(
                filename,
                Preview {
                    body,
                    published: deploy_published,
                },
            );
        }

        Ok(previews)
    }

    /// Compare the current build output against this deploy's previews for
    /// every file whose modified date is still open.
    async fn comparison_stage(
        &self,
        targets: &[Target],
        previews: &HashMap<String, Preview>,
        working: &FileMap,
        states: &mut BTreeMap<String, FileDates>,
    ) -> Result<()> {
        let pending: Vec<&Target> = targets
            .iter()
            .filter(|target| {
                states
                    .get(&target.filename)
                    .map_or(false, |dates| !dates.modified.is_established())
            })
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        // The pipeline gets an isolated deep copy; the bookkeeping map is
        // never aliased into caller-controlled transforms.
        let mut snapshot = working.clone();
        for target in &pending {
            let Some(preview) = previews.get(&target.filename) else {
                continue;
            };
            let (Some(body), Some(entry)) = (&preview.body, snapshot.get_mut(&target.filename))
            else {
                continue;
            };
            (self.options.metadata_updater)(body, entry).map_err(|e| Error::Hook {
                option: "metadata_updater",
                filename: target.filename.clone(),
                source: e,
            })?;
        }

        let built = self.pipeline.run(snapshot).await.map_err(Error::Pipeline)?;

        for target in pending {
            let Some(preview) = previews.get(&target.filename) else {
                continue;
            };
            let Some(remote) = &preview.body else {
                continue;
            };
            let Some(local) = built.get(&target.filename) else {
                warn!(
                    "{} missing from build output, no comparison this round",
                    target.filename
                );
                continue;
            };

            let local_converted =
                (self.options.contents_converter)(&local.contents).map_err(|e| Error::Hook {
                    option: "contents_converter",
                    filename: target.filename.clone(),
                    source: e,
                })?;
            let remote_converted =
                (self.options.contents_converter)(remote).map_err(|e| Error::Hook {
                    option: "contents_converter",
                    filename: target.filename.clone(),
                    source: e,
                })?;
            let equal = (self.options.contents_equals)(&local_converted, &remote_converted)
                .map_err(|e| Error::Hook {
                    option: "contents_equals",
                    filename: target.filename.clone(),
                    source: e,
                })?;

            if let Some(dates) = states.get_mut(&target.filename) {
                if equal {
                    // Identical content: the change boundary is older still.
                    dates.modified.record(preview.published);
                } else {
                    // First differing deploy: the previous iteration's value
                    // is the boundary.
                    dates.modified.establish();
                }
            }
        }

        Ok(())
    }

    /// Stamp resolved dates into metadata and run the pipeline once over the
    /// real file set.
    async fn finish(
        &self,
        mut files: FileMap,
        dates: &HashMap<String, ResolvedDates>,
    ) -> Result<FileMap> {
        for (filename, resolved) in dates {
            if let Some(entry) = files.get_mut(filename) {
                entry.metadata.insert(
                    "published".to_string(),
                    serde_json::Value::String(resolved.published.to_rfc3339()),
                );
                entry.metadata.insert(
                    "modified".to_string(),
                    serde_json::Value::String(resolved.modified.to_rfc3339()),
                );
            }
        }

        self.pipeline.run(files).await.map_err(Error::Pipeline)
    }
}

/// Join a deploy root, the configured root path, and a page's URL path.
fn join_url(deploy_root: &str, root_path: &str, url_path: &str) -> String {
    let mut parts: Vec<&str> = vec![deploy_root.trim_end_matches('/')];

    let root_path = root_path.trim_matches('/');
    if !root_path.is_empty() {
        parts.push(root_path);
    }

    let trimmed = url_path.trim_matches('/');
    if !trimmed.is_empty() {
        parts.push(trimmed);
    }

    let mut url = parts.join("/");
    if url_path.is_empty() || url_path.ends_with('/') {
        url.push('/');
    }
    url
}

fn parse_published_label(label: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(label)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}
