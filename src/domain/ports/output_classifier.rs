//! Agent-output matching port.

use crate::domain::models::{CompletionSignal, ManualStepsNote};

/// Classifies lines of agent output.
///
/// Isolates the text-matching strategy from the run state machine: the
/// controller only asks whether a line completes the run and what text it
/// contributes to the transcript.
pub trait OutputClassifier: Send + Sync {
    /// Terminal structured result record carrying the task's sentinel.
    fn detect_structured_result(&self, line: &str, task_id: &str) -> Option<CompletionSignal>;

    /// Literal sentinel line for the task, in plain output or agent text.
    fn detect_explicit_marker(&self, line: &str, task_id: &str) -> Option<CompletionSignal>;

    /// Human-readable text a raw output line contributes to the transcript.
    fn transcript_text(&self, line: &str) -> Option<String>;

    /// Manual-steps section of a transcript, if present.
    fn extract_manual_steps(&self, transcript: &str) -> Option<ManualStepsNote>;

    /// First detection path to match `line`, structured result first.
    fn classify(&self, line: &str, task_id: &str) -> Option<CompletionSignal> {
        self.detect_structured_result(line, task_id)
            .or_else(|| self.detect_explicit_marker(line, task_id))
    }
}
