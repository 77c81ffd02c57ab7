//! Process plumbing: configuration loading and the tracing subscriber.

pub mod config;
pub mod logging;
