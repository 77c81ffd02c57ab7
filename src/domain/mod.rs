//! Domain layer for the task relay
//!
//! Pure models, configuration and the port traits that adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
