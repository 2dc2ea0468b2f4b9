//! Core utilities, configuration, and common functionality

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

// Re-exports for convenience
pub use config::{Config, ConfigError};
pub use error::{AppError, AppResult, BusinessError, ErrorKind, TransportError, ValidationError};
pub use logging::init_logger;
