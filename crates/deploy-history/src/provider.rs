//! Resolution of the ordered, deduplicated deploy sequence for a site.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use sitedate_common::{Deploy, Result};
use tracing::{debug, info, warn};

use crate::api::{DeployApi, PageResponse};

/// Source of the deploy sequence consumed by the resolution engine.
#[async_trait]
pub trait DeploySource: Send + Sync {
    /// The ready deploys relevant to this build, newest first.
    async fn deploys(&self) -> Result<Vec<Deploy>>;
}

/// Deploy-history provider for one site.
///
/// Pages through the deploy-list endpoint and reduces it to the ready
/// deploys relevant to this build: commit-correlated when a hash set is
/// supplied, with the site's initial deploy appended even though it carries
/// no commit reference.
pub struct DeployHistory {
    api: Arc<dyn DeployApi>,
    api_root: String,
    site_id: String,
    commit_hashes: Option<HashSet<String>>,
}

/// Pagination scan state. The explicit visited set makes the cycle guard
/// auditable; the loop never refetches a URL it has already seen.
enum Scan {
    Scanning(String),
    Done,
}

impl DeployHistory {
    /// Create a provider for `site_id` under `api_root`.
    ///
    /// When `commit_hashes` is supplied, only deploys whose commit reference
    /// is in the set are returned and paging stops as soon as every hash has
    /// been matched.
    pub fn new(
        api: Arc<dyn DeployApi>,
        api_root: impl Into<String>,
        site_id: impl Into<String>,
        commit_hashes: Option<HashSet<String>>,
    ) -> Self {
        Self {
            api,
            api_root: api_root.into(),
            site_id: site_id.into(),
            commit_hashes,
        }
    }

    fn deploys_url(&self) -> String {
        format!(
            "{}/sites/{}/deploys",
            self.api_root.trim_end_matches('/'),
            self.site_id
        )
    }

    /// Fetch and reduce the deploy list.
    ///
    /// Deploys are returned newest first by creation time. The initial
    /// deploy (the last record of the last page, which has no commit
    /// reference) is appended at the end when it is not already present.
    pub async fn resolve_deploys(&self) -> Result<Vec<Deploy>> {
        let mut remaining = self.commit_hashes.clone();
        let mut matched: Vec<Deploy> = Vec::new();
        let mut initial: Option<Deploy> = None;
        let mut last_page_url: Option<String> = None;
        let mut visited: HashSet<String> = HashSet::new();

        let mut state = Scan::Scanning(self.deploys_url());
        while let Scan::Scanning(url) = state {
            if !visited.insert(url.clone()) {
                debug!("Already fetched {}, stopping scan", url);
                break;
            }

            let page = self.api.fetch_page(&url).await?;
            let ready = validate_page(&page);

            if let Some(last) = &page.last {
                last_page_url = Some(last.clone());
            }

            // A page without a next link is the final page of this pass; the
            // site's very first deploy sits at its tail and has no commit
            // reference.
            if page.next.is_none() {
                if let Some(candidate) = ready.last() {
                    if candidate.commit_ref.is_none() {
                        debug!("Found initial deploy {}", candidate.id);
                        initial = Some(candidate.clone());
                    }
                }
            }

            for deploy in ready {
                match &mut remaining {
                    None => matched.push(deploy),
                    Some(hashes) => {
                        if let Some(commit_ref) = &deploy.commit_ref {
                            if hashes.remove(commit_ref) {
                                matched.push(deploy);
                            }
                        }
                    }
                }
            }

            let keep_paging = remaining.as_ref().map_or(true, |hashes| !hashes.is_empty());
            state = match page.next {
                Some(next) if keep_paging => Scan::Scanning(next),
                _ if initial.is_none() => {
                    // Jump straight to the last page to look for the initial
                    // deploy instead of scanning every intermediate page.
                    match last_page_url.clone().filter(|u| !visited.contains(u)) {
                        Some(last) => Scan::Scanning(last),
                        None => Scan::Done,
                    }
                }
                _ => Scan::Done,
            };
        }

        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if let Some(initial) = initial {
            if !matched.iter().any(|d| d.id == initial.id) {
                matched.push(initial);
            }
        }

        if let Some(hashes) = &remaining {
            if !hashes.is_empty() {
                debug!("{} commit hash(es) never matched a deploy", hashes.len());
            }
        }

        info!("Resolved {} deploy(s) for site {}", matched.len(), self.site_id);

        Ok(matched)
    }
}

#[async_trait]
impl DeploySource for DeployHistory {
    async fn deploys(&self) -> Result<Vec<Deploy>> {
        self.resolve_deploys().await
    }
}

/// Validate one page of raw records and keep the ready deploys, in page order.
fn validate_page(page: &PageResponse) -> Vec<Deploy> {
    let mut deploys = Vec::with_capacity(page.records.len());
    let mut dropped = 0usize;

    for record in &page.records {
        match serde_json::from_value::<Deploy>(record.clone()) {
            Ok(deploy) => {
                if deploy.is_ready() {
                    deploys.push(deploy);
                }
            }
            Err(e) => {
                dropped += 1;
                debug!("Dropping malformed deploy record: {}", e);
            }
        }
    }

    if dropped > 0 {
        warn!("Dropped {} malformed deploy record(s)", dropped);
    }

    deploys
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use serde_json::json;

    const API_ROOT: &str = "https://api.example.com/api/v1";
    const PAGE_1: &str = "https://api.example.com/api/v1/sites/site-1/deploys";

    /// Scripted API: a map from URL to page, recording every fetch.
    struct FakeApi {
        pages: HashMap<String, PageResponse>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeApi {
        fn new(pages: Vec<(&str, PageResponse)>) -> Arc<Self> {
            Arc::new(Self {
                pages: pages
                    .into_iter()
                    .map(|(url, page)| (url.to_string(), page))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeployApi for FakeApi {
        async fn fetch_page(&self, url: &str) -> Result<PageResponse> {
            self.calls.lock().unwrap().push(url.to_string());
            Ok(self.pages.get(url).cloned().unwrap_or_default())
        }
    }

    fn record(id: &str, state: &str, commit_ref: Option<&str>, created_at: &str) -> serde_json::Value {
        json!({
            "id": id,
            "state": state,
            "name": "my-site",
            "commit_ref": commit_ref,
            "created_at": created_at,
            "updated_at": created_at,
            "published_at": null,
            "deploy_ssl_url": format!("https://{}--my-site.example.app", id),
        })
    }

    fn page(records: Vec<serde_json::Value>, next: Option<&str>, last: Option<&str>) -> PageResponse {
        PageResponse {
            records,
            next: next.map(String::from),
            last: last.map(String::from),
        }
    }

    fn history(api: Arc<FakeApi>, hashes: Option<HashSet<String>>) -> DeployHistory {
        DeployHistory::new(api, API_ROOT, "site-1", hashes)
    }

    fn hashes(values: &[&str]) -> Option<HashSet<String>> {
        Some(values.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test]
    async fn test_unfiltered_scan_returns_all_ready_deploys_newest_first() {
        let page2 = format!("{PAGE_1}?page=2");
        let api = FakeApi::new(vec![
            (
                PAGE_1,
                page(
                    vec![
                        record("d3", "ready", Some("ccc"), "2020-03-01T00:00:00Z"),
                        record("d2", "error", Some("bbb"), "2020-02-01T00:00:00Z"),
                    ],
                    Some(&page2),
                    Some(&page2),
                ),
            ),
            (
                &page2,
                page(
                    vec![
                        record("d1", "ready", Some("aaa"), "2020-01-15T00:00:00Z"),
                        record("d0", "ready", None, "2020-01-01T00:00:00Z"),
                    ],
                    None,
                    Some(&page2),
                ),
            ),
        ]);

        let deploys = history(api.clone(), None).resolve_deploys().await.unwrap();

        let ids: Vec<&str> = deploys.iter().map(|d| d.id.as_str()).collect();
        // d2 is not ready; d0 is the initial deploy and already matched, so
        // it appears exactly once.
        assert_eq!(ids, vec!["d3", "d1", "d0"]);
        assert_eq!(api.calls(), vec![PAGE_1.to_string(), page2]);
    }

    #[tokio::test]
    async fn test_hash_filter_stops_paging_once_set_is_drained() {
        let page2 = format!("{PAGE_1}?page=2");
        let page3 = format!("{PAGE_1}?page=3");
        let api = FakeApi::new(vec![
            (
                PAGE_1,
                page(
                    vec![record("d3", "ready", Some("ccc"), "2020-03-01T00:00:00Z")],
                    Some(&page2),
                    Some(&page3),
                ),
            ),
            (
                &page2,
                page(
                    vec![record("d2", "ready", Some("bbb"), "2020-02-01T00:00:00Z")],
                    Some(&page3),
                    Some(&page3),
                ),
            ),
            (
                &page3,
                page(
                    vec![record("d0", "ready", None, "2020-01-01T00:00:00Z")],
                    None,
                    Some(&page3),
                ),
            ),
        ]);

        let deploys = history(api.clone(), hashes(&["ccc"]))
            .resolve_deploys()
            .await
            .unwrap();

        let ids: Vec<&str> = deploys.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d3", "d0"]);
        // Page 2 is skipped: the hash set drained on page 1, so the scan
        // jumps straight to the last page for the initial deploy.
        assert_eq!(api.calls(), vec![PAGE_1.to_string(), page3]);
    }

    #[tokio::test]
    async fn test_empty_hash_set_returns_only_initial_deploy() {
        let page2 = format!("{PAGE_1}?page=2");
        let api = FakeApi::new(vec![
            (
                PAGE_1,
                page(
                    vec![record("d2", "ready", Some("bbb"), "2020-02-01T00:00:00Z")],
                    Some(&page2),
                    Some(&page2),
                ),
            ),
            (
                &page2,
                page(
                    vec![record("d0", "ready", None, "2020-01-01T00:00:00Z")],
                    None,
                    Some(&page2),
                ),
            ),
        ]);

        let deploys = history(api.clone(), hashes(&[]))
            .resolve_deploys()
            .await
            .unwrap();

        let ids: Vec<&str> = deploys.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d0"]);
    }

    #[tokio::test]
    async fn test_single_commit_hash_returns_match_then_initial() {
        let page2 = format!("{PAGE_1}?page=2");
        let api = FakeApi::new(vec![
            (
                PAGE_1,
                page(
                    vec![
                        record("d2", "ready", Some("bbb"), "2020-02-01T00:00:00Z"),
                        record("d1", "ready", Some("aaa"), "2020-01-15T00:00:00Z"),
                    ],
                    Some(&page2),
                    Some(&page2),
                ),
            ),
            (
                &page2,
                page(
                    vec![record("d0", "ready", None, "2020-01-01T00:00:00Z")],
                    None,
                    Some(&page2),
                ),
            ),
        ]);

        let deploys = history(api.clone(), hashes(&["aaa"]))
            .resolve_deploys()
            .await
            .unwrap();

        let ids: Vec<&str> = deploys.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d0"]);
    }

    #[tokio::test]
    async fn test_duplicate_commit_ref_matches_only_newest_deploy() {
        let api = FakeApi::new(vec![(
            PAGE_1,
            page(
                vec![
                    record("d2", "ready", Some("aaa"), "2020-02-01T00:00:00Z"),
                    record("d1", "ready", Some("aaa"), "2020-01-15T00:00:00Z"),
                    record("d0", "ready", None, "2020-01-01T00:00:00Z"),
                ],
                None,
                None,
            ),
        )]);

        let deploys = history(api, hashes(&["aaa"])).resolve_deploys().await.unwrap();

        let ids: Vec<&str> = deploys.iter().map(|d| d.id.as_str()).collect();
        // The hash is consumed by its first (newest) match.
        assert_eq!(ids, vec!["d2", "d0"]);
    }

    #[tokio::test]
    async fn test_malformed_records_are_dropped() {
        let api = FakeApi::new(vec![(
            PAGE_1,
            page(
                vec![
                    record("d1", "ready", Some("aaa"), "2020-01-15T00:00:00Z"),
                    json!({"id": "broken"}),
                    json!(42),
                ],
                None,
                None,
            ),
        )]);

        let deploys = history(api, None).resolve_deploys().await.unwrap();
        let ids: Vec<&str> = deploys.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d1"]);
    }

    #[tokio::test]
    async fn test_cycle_guard_terminates_self_referencing_pages() {
        let api = FakeApi::new(vec![(
            PAGE_1,
            page(
                vec![record("d1", "ready", Some("aaa"), "2020-01-15T00:00:00Z")],
                Some(PAGE_1),
                Some(PAGE_1),
            ),
        )]);

        let deploys = history(api.clone(), None).resolve_deploys().await.unwrap();

        let ids: Vec<&str> = deploys.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d1"]);
        assert_eq!(api.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_page_is_treated_as_empty() {
        // The fake returns a default (empty) page for unscripted URLs, which
        // is exactly what the API client produces for a non-array body.
        let api = FakeApi::new(vec![]);
        let deploys = history(api, None).resolve_deploys().await.unwrap();
        assert!(deploys.is_empty());
    }
}
