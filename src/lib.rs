//! Taskrelay - webhook-driven automation relay
//!
//! Taskrelay receives task-lifecycle events from a work tracker (ClickUp or
//! GitHub), provisions an isolated git worktree, hands the task to an external
//! coding agent, and reconciles the outcome back into the originating task.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, configuration and port traits
//! - **Service Layer** (`services`): classification, output matching, worktrees
//! - **Application Layer** (`application`): the agent run lifecycle and reconciliation
//! - **Adapters** (`adapters`): platform REST clients and the webhook receiver
//! - **Infrastructure Layer** (`infrastructure`): configuration loading and logging
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use application::{
    AgentRunController, CompletionLatch, CompletionReconciler, RunOrchestrator, RunOutcome,
};
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    CompletionSignal, Config, Platform, PullRequest, RunContext, RunState, TaskType, WorkItem,
};
pub use domain::ports::{OutputClassifier, PlatformClient, PullRequestHost};
pub use infrastructure::config::{ConfigError, ConfigLoader};
