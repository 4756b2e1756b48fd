//! # Ferros Utilities
//!
//! Logging and configuration shared by the Ferros binaries.
//!
//! The `tracing` macros are re-exported so crates that only log can depend
//! on this crate alone.

pub mod config;
pub mod logging;

pub use config::{ConfigError, ConfigOverrides, FerrosConfig};
pub use logging::{init_logging, init_logging_for_terminal, LogFormat, LogGuard, LogLevel, LoggingError};
pub use tracing::{debug, error, info, trace, warn};
