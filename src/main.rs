//! diffdibb entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Apply the logging configuration, or fall back to a stderr logger
//!   3. Load settings
//!   4. Print settings as JSON
//!
//! Paths come from `DIFFDIBB_LOGGING_CONFIG_FILE` and `DIFFDIBB_CONFIG_FILE`,
//! defaulting to the files under `/etc/diffdibb/`.

use std::env;

use diffdibb::config::{self, ConfigStore};
use diffdibb::error::ConfigError;
use diffdibb::logger::{self, LoggingBootstrap};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot render settings: {0}")]
    Render(#[from] serde_json::Error),
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    // Load .env if present; errors are ignored, the file is optional.
    let _ = dotenvy::dotenv();

    let mut bootstrap = LoggingBootstrap::new();
    if let Ok(path) = env::var("DIFFDIBB_LOGGING_CONFIG_FILE") {
        bootstrap = bootstrap.with_default_path(config::expand_home(&path));
    }

    let log_level = env::var("DIFFDIBB_LOG_LEVEL").ok();
    match bootstrap.load_default() {
        Ok(()) => {}
        Err(e) if e.is_missing_file() => {
            logger::init_fallback(log_level.as_deref().unwrap_or("info"), log_level.is_some())?;
            error!(component = "logging", path = %bootstrap.default_path().display(), "{e}");
            warn!(path = %bootstrap.default_path().display(), "no logging configuration, using stderr");
        }
        Err(e) => return Err(e.into()),
    }

    let mut store = ConfigStore::new();
    if let Ok(path) = env::var("DIFFDIBB_CONFIG_FILE") {
        store = store.with_default_path(config::expand_home(&path));
    }

    let settings = store.get()?;
    info!(
        version = diffdibb::VERSION,
        sections = settings.len(),
        "settings ready"
    );

    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}
