//! Sentinel-based classification of coding-agent output.
//!
//! The agent writes newline-delimited JSON events (`stream-json`) or plain
//! text. Completion is recognised from a literal sentinel line
//! (`AUTOMATION_COMPLETE: Task <id> ...`), either in the agent's text or
//! embedded in the payload of its terminal `result` record.

use regex::Regex;
use serde_json::Value;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CompletionSignal, ManualStepsNote, ResultSubtype};
use crate::domain::ports::OutputClassifier;

/// Matches agent output against the configured sentinel and manual-steps
/// heading.
#[derive(Debug, Clone)]
pub struct SentinelClassifier {
    sentinel_prefix: String,
    marker: String,
    marker_level: usize,
    heading: Regex,
}

impl SentinelClassifier {
    /// `sentinel_prefix` is the text before `: Task <id>`; `marker` is the
    /// heading line that opens the manual-steps section (e.g. `## Manual Steps`).
    pub fn new(sentinel_prefix: impl Into<String>, marker: impl Into<String>) -> DomainResult<Self> {
        let sentinel_prefix = sentinel_prefix.into();
        let marker = marker.into().trim().to_string();
        if sentinel_prefix.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "sentinel prefix cannot be empty".to_string(),
            ));
        }
        let heading = Regex::new(r"^(#{1,6})\s+\S")
            .map_err(|e| DomainError::ValidationFailed(format!("heading pattern: {e}")))?;
        let marker_level = marker.chars().take_while(|c| *c == '#').count();

        Ok(Self {
            sentinel_prefix,
            marker,
            marker_level,
            heading,
        })
    }

    /// The exact line the agent is told to print for `task_id`.
    pub fn sentinel_for(&self, task_id: &str) -> String {
        format!("{}: Task {task_id}", self.sentinel_prefix)
    }

    /// First line of `text` that starts with the task's sentinel.
    ///
    /// The sentinel must be followed by a non-alphanumeric character so that
    /// task `T1` is not completed by a line for `T10`.
    fn find_sentinel_line<'a>(&self, text: &'a str, task_id: &str) -> Option<&'a str> {
        let sentinel = self.sentinel_for(task_id);
        text.lines().map(str::trim).find(|line| {
            line.strip_prefix(sentinel.as_str())
                .is_some_and(|rest| !rest.starts_with(|c: char| c.is_alphanumeric()))
        })
    }

    /// Heading depth of `line`, or `None` if it is not a markdown heading.
    fn heading_level(&self, line: &str) -> Option<usize> {
        self.heading
            .captures(line.trim_start())
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().len())
    }
}

/// Parse `line` as a JSON object, ignoring anything that is not one.
fn parse_record(line: &str) -> Option<Value> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    serde_json::from_str::<Value>(trimmed)
        .ok()
        .filter(Value::is_object)
}

fn record_type(record: &Value) -> Option<&str> {
    record.get("type").and_then(Value::as_str)
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Text blocks of an `assistant` record (`message.content[].text`).
fn assistant_text(record: &Value) -> Option<String> {
    if let Some(blocks) = record
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
    {
        let text: Vec<&str> = blocks
            .iter()
            .filter(|block| record_type(block) == Some("text"))
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect();
        return (!text.is_empty()).then(|| text.join("\n"));
    }

    record
        .get("content")
        .or_else(|| record.get("text"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

impl OutputClassifier for SentinelClassifier {
    fn detect_structured_result(&self, line: &str, task_id: &str) -> Option<CompletionSignal> {
        let record = parse_record(line)?;
        if record_type(&record) != Some("result") {
            return None;
        }
        let payload = record.get("result").and_then(value_text)?;
        self.find_sentinel_line(&payload, task_id)?;

        let subtype = match record.get("subtype").and_then(Value::as_str) {
            Some(subtype) => ResultSubtype::parse(subtype),
            None if record.get("is_error").and_then(Value::as_bool) == Some(true) => {
                ResultSubtype::Error
            }
            None => ResultSubtype::Success,
        };
        Some(CompletionSignal::StructuredResult {
            subtype,
            raw: record,
        })
    }

    fn detect_explicit_marker(&self, line: &str, task_id: &str) -> Option<CompletionSignal> {
        let text = self.transcript_text(line)?;
        self.find_sentinel_line(&text, task_id)
            .map(|payload| CompletionSignal::ExplicitMarker {
                payload: payload.to_string(),
            })
    }

    fn transcript_text(&self, line: &str) -> Option<String> {
        if line.trim().is_empty() {
            return None;
        }
        let Some(record) = parse_record(line) else {
            return Some(line.to_string());
        };

        match record_type(&record)? {
            "assistant" | "text" => assistant_text(&record),
            "content_block_delta" => record
                .get("delta")
                .and_then(|d| d.get("text"))
                .and_then(Value::as_str)
                .map(ToString::to_string),
            "result" => record.get("result").and_then(value_text),
            // system, user (tool results), tool_use and anything newer
            _ => None,
        }
    }

    fn extract_manual_steps(&self, transcript: &str) -> Option<ManualStepsNote> {
        let lines: Vec<&str> = transcript.lines().collect();
        let start = lines
            .iter()
            .rposition(|line| line.trim().eq_ignore_ascii_case(&self.marker))?;

        let body: Vec<&str> = lines[start + 1..]
            .iter()
            .take_while(|line| {
                !line.trim_start().starts_with(self.sentinel_prefix.as_str())
                    && self
                        .heading_level(line)
                        .is_none_or(|level| self.marker_level > 0 && level > self.marker_level)
            })
            .copied()
            .collect();

        let text = body.join("\n").trim().to_string();
        (!text.is_empty()).then_some(ManualStepsNote(text))
    }
}
