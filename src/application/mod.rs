pub mod agent_run_controller;
pub mod completion_latch;
pub mod completion_reconciler;
pub mod run_orchestrator;

pub use agent_run_controller::{AgentRunController, RunOutcome};
pub use completion_latch::CompletionLatch;
pub use completion_reconciler::{CompletionReconciler, FixedAttempts, PrLookup, ReconcileReport};
pub use run_orchestrator::{RunError, RunOrchestrator, RunTrigger};
