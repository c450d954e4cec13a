//! Load outcome reporting.
//!
//! The store and the logging bootstrap never log directly; they hand a
//! [`LoadEvent`] to a [`LoadObserver`]. [`TracingObserver`] is the default and
//! turns events into `tracing` records. Tests plug in [`RecordingObserver`].

use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::ConfigError;

/// Which component produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Settings,
    Logging,
}

impl Component {
    pub fn as_str(self) -> &'static str {
        match self {
            Component::Settings => "settings",
            Component::Logging => "logging",
        }
    }
}

/// Outcome of a single load call.
#[derive(Debug)]
pub enum LoadEvent<'a> {
    /// Precondition failed: the file is absent or not a regular file.
    Missing { path: &'a Path, error: &'a ConfigError },
    Loaded { path: &'a Path },
    /// Read, parse or apply failed after the precondition passed.
    Failed { path: &'a Path, error: &'a ConfigError },
}

pub trait LoadObserver {
    fn on_event(&self, component: Component, event: &LoadEvent<'_>);
}

/// Emits `error` for missing files, `info` on success, and `error` plus a
/// `debug` record with the full cause chain on failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl LoadObserver for TracingObserver {
    fn on_event(&self, component: Component, event: &LoadEvent<'_>) {
        let component = component.as_str();
        match event {
            LoadEvent::Missing { path, error } => {
                tracing::error!(component, path = %path.display(), "{error}");
            }
            LoadEvent::Loaded { path } => {
                tracing::info!(component, path = %path.display(), "configuration file was loaded");
            }
            LoadEvent::Failed { path, error } => {
                tracing::error!(
                    component,
                    path = %path.display(),
                    "failed to load configuration from {}",
                    path.display()
                );
                tracing::debug!(component, detail = %error_chain(*error), "{error}");
            }
        }
    }
}

/// Render an error followed by each of its sources, `: `-separated.
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

/// Owned copy of a [`LoadEvent`], kept by [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
    Missing { component: Component, path: String, message: String },
    Loaded { component: Component, path: String },
    Failed { component: Component, path: String, message: String },
}

/// Observer that keeps every event in memory. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl LoadObserver for RecordingObserver {
    fn on_event(&self, component: Component, event: &LoadEvent<'_>) {
        let recorded = match event {
            LoadEvent::Missing { path, error } => RecordedEvent::Missing {
                component,
                path: path.display().to_string(),
                message: error.to_string(),
            },
            LoadEvent::Loaded { path } => RecordedEvent::Loaded {
                component,
                path: path.display().to_string(),
            },
            LoadEvent::Failed { path, error } => RecordedEvent::Failed {
                component,
                path: path.display().to_string(),
                message: error.to_string(),
            },
        };
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(recorded);
    }
}

impl<O: LoadObserver + ?Sized> LoadObserver for Arc<O> {
    fn on_event(&self, component: Component, event: &LoadEvent<'_>) {
        (**self).on_event(component, event)
    }
}
