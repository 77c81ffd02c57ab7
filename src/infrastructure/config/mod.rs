//! Config file discovery and loading.

pub mod loader;

pub use loader::{ConfigError, ConfigLoader, CONFIG_DIR};
