//! GitHub integration.
//!
//! Issues act as work items; open pull requests are the completion
//! evidence for every platform.

pub mod client;
pub mod models;
pub mod platform;

pub use client::GitHubClient;
pub use platform::{GitHubPlatform, GitHubPullRequests};
