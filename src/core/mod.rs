//! # Core Module
//!
//! Crate-wide error type and service configuration.

pub mod config;
pub mod error;

pub use config::ServiceConfig;
pub use error::{ServiceError, ServiceResult};
