//! Work-tracker port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Platform, WorkItem};

/// Thin, stateless access to a work-tracking platform.
///
/// Every call is a single request/response; implementations do not retry.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Which platform this client talks to.
    fn platform(&self) -> Platform;

    /// Fetch a task or issue by its external id.
    async fn get_work_item(&self, id: &str) -> DomainResult<WorkItem>;

    /// Move the item to the status with the given label.
    async fn update_status(&self, id: &str, status: &str) -> DomainResult<()>;

    /// Set a named custom field. Implementations resolve the name to the
    /// platform's internal field id.
    async fn set_custom_field(&self, id: &str, field_name: &str, value: &str) -> DomainResult<()>;

    /// Post a comment on the item.
    async fn add_comment(&self, id: &str, text: &str) -> DomainResult<()>;
}
