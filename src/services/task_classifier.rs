//! Task classification and branch naming.
//!
//! Branch names follow `{taskId}/{taskType}/{slug}`. The work tracker matches
//! PRs back to tasks by this exact string, so the grammar must not drift.

use crate::domain::models::{TaskType, WorkItem};

/// Maximum slug length in characters.
pub const MAX_SLUG_LEN: usize = 50;

/// Slug used when a title has no usable characters.
const EMPTY_SLUG: &str = "untitled";

/// Keyword groups in priority order. The first group with a hit wins.
const KEYWORDS: [(TaskType, &[&str]); 3] = [
    (TaskType::Bug, &["bug", "fix", "error", "broken", "crash"]),
    (TaskType::Update, &["update", "enhance", "improve", "optimize", "upgrade"]),
    (TaskType::Chore, &["chore", "refactor", "cleanup", "clean up", "maintenance"]),
];

/// Classify a task from its title and description.
///
/// Case-insensitive substring match against [`KEYWORDS`]; anything
/// unmatched is a feature.
pub fn classify(title: &str, description: &str) -> TaskType {
    let text = format!("{title} {description}").to_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|word| text.contains(word)))
        .map_or(TaskType::Feature, |(task_type, _)| *task_type)
}

/// Classify a work item, preferring explicit metadata over free text.
///
/// Labels are checked first, then a `Type` custom field, then the
/// title/description keywords.
pub fn classify_work_item(item: &WorkItem) -> TaskType {
    item.labels
        .iter()
        .find_map(|label| category_hint(label))
        .or_else(|| item.custom_field("type").and_then(category_hint))
        .unwrap_or_else(|| classify(&item.title, &item.description))
}

/// Category named by a tag or field value, e.g. "bugfix" or "Enhancement".
fn category_hint(value: &str) -> Option<TaskType> {
    let value = value.to_lowercase();
    if value.contains("bug") || value.contains("fix") {
        Some(TaskType::Bug)
    } else if value.contains("feature") {
        Some(TaskType::Feature)
    } else if value.contains("chore") || value.contains("refactor") {
        Some(TaskType::Chore)
    } else if value.contains("update") || value.contains("enhance") {
        Some(TaskType::Update)
    } else {
        None
    }
}

/// Turn a title into a branch-safe slug.
///
/// Lower-cases, drops everything outside `[a-z0-9]`, whitespace and hyphens,
/// collapses whitespace/hyphen runs into one hyphen, trims hyphens from both
/// ends and truncates to [`MAX_SLUG_LEN`]. The result always matches
/// `^[a-z0-9-]{0,50}$` with no leading, trailing or doubled hyphens.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len().min(MAX_SLUG_LEN));
    let mut pending_hyphen = false;

    for ch in title.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch);
        } else if ch.is_whitespace() || ch == '-' {
            pending_hyphen = true;
        }

        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }

    slug.truncate(MAX_SLUG_LEN);
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Assemble `{taskId}/{taskType}/{slug}`.
pub fn branch_name(task_id: &str, task_type: TaskType, title: &str) -> String {
    let slug = slugify(title);
    let slug = if slug.is_empty() { EMPTY_SLUG } else { slug.as_str() };
    format!("{task_id}/{task_type}/{slug}")
}
