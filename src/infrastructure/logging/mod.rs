//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty console output on stderr
//! - Rolling JSON log files
//! - Log retention
//! - Secret scrubbing for logged payloads

pub mod config;
pub mod logger;
pub mod retention;
pub mod secret_scrubbing;

pub use config::{LogConfig, LogFormat, RotationPolicy};
pub use logger::LoggerImpl;
pub use retention::LogRetention;
pub use secret_scrubbing::SecretScrubber;
