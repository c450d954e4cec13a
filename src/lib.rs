//! diffdibb: settings cache and logging bootstrap.
//!
//! - [`config::ConfigStore`] loads and caches INI settings.
//! - [`logger::LoggingBootstrap`] applies a logging configuration file to the
//!   process-wide tracing subscriber.
//! - [`observe`] carries load outcomes to a pluggable observer.

pub mod config;
pub mod error;
pub mod logger;
pub mod observe;

pub use config::{ConfigStore, Settings};
pub use error::ConfigError;
pub use logger::LoggingBootstrap;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
