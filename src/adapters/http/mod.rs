//! HTTP surface: the webhook receiver and its request authentication.

pub mod signature;
pub mod webhook;

pub use webhook::{WebhookDecision, WebhookServer, WebhookState};
