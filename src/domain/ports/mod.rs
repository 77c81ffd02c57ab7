//! Port trait definitions (Hexagonal Architecture)
//!
//! The run lifecycle talks to the outside world only through these traits:
//! - `PlatformClient`: the work tracker a task came from
//! - `PullRequestHost`: the version-control host queried for completion evidence
//! - `WorkspaceProvider`: disposable per-run worktrees
//! - `OutputClassifier`: completion and manual-steps matching over agent output

pub mod output_classifier;
pub mod platform_client;
pub mod pull_request_host;
pub mod workspace;

pub use output_classifier::OutputClassifier;
pub use platform_client::PlatformClient;
pub use pull_request_host::PullRequestHost;
pub use workspace::WorkspaceProvider;
