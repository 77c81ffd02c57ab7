//! Adapters connecting the relay to external systems.

pub mod http;
pub mod plugins;
