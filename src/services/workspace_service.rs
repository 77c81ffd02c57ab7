//! Workspace Service
//!
//! Provides disposable git worktrees for agent runs. Each run gets its own
//! worktree on a fresh branch cut from the remote's base branch, so
//! concurrent runs never share a working directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::RepositoryConfig;
use crate::domain::ports::WorkspaceProvider;

/// Output of a finished git command.
struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

/// Git worktree manager for a single base repository.
///
/// # Layout
///
/// - Branch: the run's branch name, e.g. `86abc/feature/add-login`
/// - Worktree: `<worktree_root>/86abc-feature-add-login`
#[derive(Debug, Clone)]
pub struct WorkspaceService {
    repo_path: PathBuf,
    remote: String,
    base_branch: String,
    worktree_root: PathBuf,
    seed_files: Vec<String>,
}

impl WorkspaceService {
    pub fn new(config: &RepositoryConfig) -> Self {
        let repo_path =
            std::path::absolute(&config.path).unwrap_or_else(|_| config.path.clone());
        let worktree_root = if config.worktree_root.is_absolute() {
            config.worktree_root.clone()
        } else {
            repo_path.join(&config.worktree_root)
        };

        Self {
            repo_path,
            remote: config.remote.clone(),
            base_branch: config.base_branch.clone(),
            worktree_root,
            seed_files: config.seed_files.clone(),
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Directory a branch's worktree lives in.
    pub fn worktree_path(&self, branch: &str) -> PathBuf {
        self.worktree_root.join(branch.replace('/', "-"))
    }

    async fn git(&self, args: &[&str]) -> DomainResult<GitOutput> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DomainError::Workspace(format!("failed to run git {}: {e}", args.join(" "))))?;

        Ok(GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    async fn ref_exists(&self, reference: &str) -> bool {
        self.git(&["rev-parse", "--verify", "--quiet", reference])
            .await
            .is_ok_and(|out| out.success)
    }

    /// Remove a leftover worktree and branch from an earlier attempt.
    async fn remove_stale(&self, branch: &str, path: &Path) -> DomainResult<()> {
        if path.exists() {
            warn!(path = %path.display(), "Removing stale worktree");
            let path_arg = path.to_string_lossy().into_owned();
            let removed = self.git(&["worktree", "remove", "--force", path_arg.as_str()]).await?;
            if !removed.success {
                debug!(stderr = %removed.stderr, "git worktree remove failed, deleting directory");
            }
            if path.exists() {
                tokio::fs::remove_dir_all(path).await.map_err(|e| {
                    DomainError::Workspace(format!(
                        "failed to remove stale worktree {}: {e}",
                        path.display()
                    ))
                })?;
            }
        }

        self.git(&["worktree", "prune"]).await?;

        if self.ref_exists(&format!("refs/heads/{branch}")).await {
            let deleted = self.git(&["branch", "-D", branch]).await?;
            if deleted.success {
                info!(branch = %branch, "Deleted stale branch");
            } else {
                warn!(branch = %branch, stderr = %deleted.stderr, "Failed to delete stale branch");
            }
        }

        Ok(())
    }

    /// Ref the new branch starts from: the remote base branch when known.
    async fn start_point(&self) -> String {
        let fetched = self.git(&["fetch", self.remote.as_str(), self.base_branch.as_str()]).await;
        match fetched {
            Ok(out) if out.success => {}
            Ok(out) => warn!(remote = %self.remote, stderr = %out.stderr, "git fetch failed, using local refs"),
            Err(e) => warn!(remote = %self.remote, error = %e, "git fetch failed, using local refs"),
        }

        let remote_ref = format!("{}/{}", self.remote, self.base_branch);
        if self.ref_exists(&format!("refs/remotes/{remote_ref}")).await {
            remote_ref
        } else {
            self.base_branch.clone()
        }
    }

    /// Copy local configuration files into the worktree. Never fatal.
    async fn seed(&self, worktree: &Path) {
        for name in &self.seed_files {
            let source = self.repo_path.join(name);
            if !source.is_file() {
                debug!(file = %name, "Seed file not present, skipping");
                continue;
            }

            let target = worktree.join(name);
            if let Some(parent) = target.parent() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    warn!(file = %name, error = %e, "Failed to create seed file directory");
                    continue;
                }
            }
            match tokio::fs::copy(&source, &target).await {
                Ok(_) => debug!(file = %name, "Seeded worktree"),
                Err(e) => warn!(file = %name, error = %e, "Failed to copy seed file"),
            }
        }
    }

    /// Health probe: the base repository is a git repo and has the base branch.
    pub async fn check_repository(&self) -> DomainResult<()> {
        let git_dir = self.git(&["rev-parse", "--git-dir"]).await?;
        if !git_dir.success {
            return Err(DomainError::Workspace(format!(
                "{} is not a git repository",
                self.repo_path.display()
            )));
        }

        let local = format!("refs/heads/{}", self.base_branch);
        let remote = format!("refs/remotes/{}/{}", self.remote, self.base_branch);
        if !self.ref_exists(&local).await && !self.ref_exists(&remote).await {
            return Err(DomainError::Workspace(format!(
                "base branch '{}' not found",
                self.base_branch
            )));
        }
        Ok(())
    }

    /// `owner/repo` of the configured remote, when it points at GitHub.
    pub async fn remote_slug(&self) -> Option<(String, String)> {
        let url = self.git(&["remote", "get-url", self.remote.as_str()]).await.ok()?;
        if !url.success {
            return None;
        }
        parse_github_slug(&url.stdout)
    }
}

#[async_trait]
impl WorkspaceProvider for WorkspaceService {
    #[instrument(skip(self), fields(repo = %self.repo_path.display()))]
    async fn provision(&self, branch: &str) -> DomainResult<PathBuf> {
        let path = self.worktree_path(branch);
        self.remove_stale(branch, &path).await?;

        tokio::fs::create_dir_all(&self.worktree_root).await.map_err(|e| {
            DomainError::Workspace(format!(
                "failed to create worktree root {}: {e}",
                self.worktree_root.display()
            ))
        })?;

        let start = self.start_point().await;
        let path_arg = path.to_string_lossy().into_owned();
        let added = self
            .git(&["worktree", "add", "-b", branch, path_arg.as_str(), start.as_str()])
            .await?;
        if !added.success {
            error!(branch = %branch, stderr = %added.stderr, "Failed to create git worktree");
            return Err(DomainError::Workspace(format!(
                "git worktree add failed: {}",
                added.stderr
            )));
        }

        self.seed(&path).await;
        info!(branch = %branch, path = %path.display(), start = %start, "Workspace provisioned");
        Ok(path)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn release(&self, path: &Path) -> DomainResult<()> {
        if !path.exists() {
            debug!("Workspace already gone");
            return Ok(());
        }

        let path_arg = path.to_string_lossy().into_owned();
        let removed = self.git(&["worktree", "remove", "--force", path_arg.as_str()]).await?;
        if !removed.success {
            warn!(stderr = %removed.stderr, "git worktree remove failed, deleting directory");
        }
        if path.exists() {
            tokio::fs::remove_dir_all(path).await.map_err(|e| {
                DomainError::Workspace(format!("failed to remove {}: {e}", path.display()))
            })?;
        }
        self.git(&["worktree", "prune"]).await?;

        info!("Workspace released");
        Ok(())
    }
}

/// Extract `(owner, repo)` from an SSH or HTTPS GitHub remote URL.
pub fn parse_github_slug(url: &str) -> Option<(String, String)> {
    let rest = url
        .trim()
        .strip_prefix("git@github.com:")
        .or_else(|| url.trim().strip_prefix("ssh://git@github.com/"))
        .or_else(|| url.trim().strip_prefix("https://github.com/"))
        .or_else(|| url.trim().strip_prefix("http://github.com/"))?;
    let rest = rest.trim_end_matches('/');
    let rest = rest.strip_suffix(".git").unwrap_or(rest);

    let (owner, repo) = rest.split_once('/')?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}
