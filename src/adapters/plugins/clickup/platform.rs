//! ClickUp implementation of [`PlatformClient`].
//!
//! Maps ClickUp tasks to [`WorkItem`]s and resolves custom field names to
//! the field ids the write endpoint needs.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Platform, WorkItem};
use crate::domain::ports::PlatformClient;

use super::client::ClickUpClient;
use super::models::ClickUpTask;

/// Work-tracker access backed by the ClickUp API.
#[derive(Debug, Clone)]
pub struct ClickUpPlatform {
    client: Arc<ClickUpClient>,
}

impl ClickUpPlatform {
    pub fn new(client: Arc<ClickUpClient>) -> Self {
        Self { client }
    }

    /// Convert a [`ClickUpTask`] to a [`WorkItem`].
    fn to_work_item(task: ClickUpTask) -> WorkItem {
        let description = task
            .description
            .filter(|d| !d.trim().is_empty())
            .or(task.text_content)
            .unwrap_or_default();

        let mut item = WorkItem::new(task.id, task.name, Platform::ClickUp)
            .with_description(description)
            .with_status(task.status.status);

        for tag in task.tags {
            item = item.with_label(tag.name);
        }
        for field in task.custom_fields {
            if let Some(value) = field.display_value() {
                item = item.with_custom_field(field.name, value);
            }
        }
        item.url = task.url;
        item
    }
}

#[async_trait]
impl PlatformClient for ClickUpPlatform {
    fn platform(&self) -> Platform {
        Platform::ClickUp
    }

    async fn get_work_item(&self, id: &str) -> DomainResult<WorkItem> {
        let task = self.client.get_task(id).await?;
        Ok(Self::to_work_item(task))
    }

    async fn update_status(&self, id: &str, status: &str) -> DomainResult<()> {
        tracing::debug!(task_id = id, status = status, "Updating ClickUp task status");
        self.client.update_task_status(id, status).await
    }

    async fn set_custom_field(&self, id: &str, field_name: &str, value: &str) -> DomainResult<()> {
        // Field ids are per list, so look them up on the task itself.
        let task = self.client.get_task(id).await?;
        let field = task
            .custom_fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(field_name))
            .ok_or_else(|| DomainError::CustomFieldNotFound {
                task_id: id.to_string(),
                field: field_name.to_string(),
            })?;

        tracing::debug!(task_id = id, field = field_name, field_id = %field.id, "Setting ClickUp custom field");
        self.client
            .set_custom_field_value(id, &field.id, json!(value))
            .await
    }

    async fn add_comment(&self, id: &str, text: &str) -> DomainResult<()> {
        self.client.post_comment(id, text).await
    }
}
