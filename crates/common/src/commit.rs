//! Commits from the source-control log, used to correlate deploys.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A commit from the first-parent log, newest first.
///
/// Produced by the caller's log reader; the resolution core only consumes
/// the hash set when filtering the deploy list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub hash: String,
    pub author_date: DateTime<Utc>,
    pub commit_date: DateTime<Utc>,
}

/// Collect the candidate hash set for deploy correlation.
pub fn hash_set(commits: &[Commit]) -> HashSet<String> {
    commits.iter().map(|c| c.hash.clone()).collect()
}
