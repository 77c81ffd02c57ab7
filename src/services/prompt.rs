//! Prompt given to the coding agent on its input channel.

use std::fmt::Write;

use crate::domain::models::{TaskType, WorkItem};

/// Inputs for [`build_prompt`].
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub work_item: &'a WorkItem,
    pub task_type: TaskType,
    pub branch: &'a str,
    pub base_branch: &'a str,
    /// Full sentinel, e.g. `AUTOMATION_COMPLETE: Task 86abc`.
    pub sentinel: &'a str,
    pub manual_steps_marker: &'a str,
}

/// Line the agent must print once its PR is open.
pub fn completion_line(sentinel: &str) -> String {
    format!("{sentinel} implementation finished, PR created")
}

/// Build the structured task prompt.
pub fn build_prompt(inputs: &PromptInputs<'_>) -> String {
    let item = inputs.work_item;
    let description = if item.description.trim().is_empty() {
        "(no description provided)"
    } else {
        item.description.trim()
    };

    let mut prompt = String::new();
    let _ = writeln!(prompt, "# Task {}: {}", item.id, item.title);
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Platform: {}", item.platform);
    let _ = writeln!(prompt, "Type: {}", inputs.task_type);
    let _ = writeln!(prompt, "Branch: {} (already checked out)", inputs.branch);
    if let Some(url) = &item.url {
        let _ = writeln!(prompt, "Link: {url}");
    }
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "## Description");
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "{description}");
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "## Workflow");
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "1. Implement the task in this working directory.");
    let _ = writeln!(prompt, "2. Run the project's tests and fix any failures you introduced.");
    let _ = writeln!(prompt, "3. Commit your changes to `{}`.", inputs.branch);
    let _ = writeln!(prompt, "4. Push `{}` to the remote.", inputs.branch);
    let _ = writeln!(
        prompt,
        "5. Open a pull request from `{}` into `{}`.",
        inputs.branch, inputs.base_branch
    );
    let _ = writeln!(
        prompt,
        "6. If anything must be done by a human (secrets, migrations, console settings), \
         list it under a `{}` heading in your final message, before the completion line. \
         Do not perform those steps yourself.",
        inputs.manual_steps_marker
    );
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "## Completion");
    let _ = writeln!(prompt);
    let _ = writeln!(
        prompt,
        "When the pull request is open, print this line exactly, on its own line. \
         It must be the last thing you print: output after it is not acted on."
    );
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "{}", completion_line(inputs.sentinel));
    prompt
}
