pub mod config;
pub mod pull_request;
pub mod run;
pub mod task_type;
pub mod work_item;

pub use config::{
    AgentConfig, ClickUpConfig, Config, GitHubConfig, LoggingConfig, ReconcileConfig,
    RepositoryConfig, ServerConfig,
};
pub use pull_request::PullRequest;
pub use run::{AgentExit, CompletionSignal, ManualStepsNote, ResultSubtype, RunContext, RunState};
pub use task_type::TaskType;
pub use work_item::{Platform, WorkItem};
