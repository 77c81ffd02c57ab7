//! Workspace port.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::domain::errors::DomainResult;

/// Provides isolated, disposable working copies of the base repository.
#[async_trait]
pub trait WorkspaceProvider: Send + Sync {
    /// Create a fresh workspace on a new branch named `branch`, replacing any
    /// stale workspace or branch of the same name.
    async fn provision(&self, branch: &str) -> DomainResult<PathBuf>;

    /// Remove a workspace. Removing one that no longer exists succeeds.
    async fn release(&self, path: &Path) -> DomainResult<()>;
}
