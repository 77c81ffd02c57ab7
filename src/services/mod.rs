pub mod output_classifier;
pub mod prompt;
pub mod run_log;
pub mod task_classifier;
pub mod workspace_service;

pub use output_classifier::SentinelClassifier;
pub use prompt::{build_prompt, completion_line, PromptInputs};
pub use run_log::{OutputStream, RunLog};
pub use task_classifier::{branch_name, classify, classify_work_item, slugify};
pub use workspace_service::WorkspaceService;
