//! ClickUp integration.
//!
//! Reads tasks, moves their status, writes custom fields and posts
//! comments through the ClickUp REST API v2.

pub mod client;
pub mod models;
pub mod platform;

pub use client::ClickUpClient;
pub use platform::ClickUpPlatform;
