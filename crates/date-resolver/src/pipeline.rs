//! The build-pipeline collaborator.

use async_trait::async_trait;

use crate::options::FileMap;

/// Runs the caller's transform stages over a file map and returns the
/// transformed map.
///
/// The engine always passes an owned snapshot: once per deploy that needs a
/// content comparison, and once at the end over the real file set. The
/// stages may be user-supplied and side-effecting, so they never see the
/// engine's bookkeeping map.
#[async_trait]
pub trait BuildPipeline: Send + Sync {
    async fn run(&self, files: FileMap) -> anyhow::Result<FileMap>;
}
