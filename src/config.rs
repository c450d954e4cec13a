//! Settings cache.
//!
//! Reads an INI file into [`Settings`] (section -> key -> value) and keeps the
//! last successful result in a [`ConfigStore`] until it is reset or replaced.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use ini::{Ini, ParseOption};
use serde::Serialize;

use crate::error::{self, ConfigError};
use crate::observe::{Component, LoadEvent, LoadObserver, TracingObserver};

/// Default location of the settings file.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/diffdibb/diffdibb.cfg";

/// Section whose keys every other section inherits. Never surfaced itself.
pub const DEFAULT_SECTION: &str = "DEFAULT";

/// Key/value pairs of one section.
pub type Section = BTreeMap<String, String>;

/// Parsed configuration: section name -> key -> value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Settings {
    sections: BTreeMap<String, Section>,
}

impl Settings {
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    /// Value of `key` in `section`. Keys are stored lower-cased, so the lookup
    /// lower-cases `key` too.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(&key.to_lowercase()))
            .map(String::as_str)
    }

    pub fn contains_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

impl FromIterator<(String, Section)> for Settings {
    fn from_iter<I: IntoIterator<Item = (String, Section)>>(iter: I) -> Self {
        Self { sections: iter.into_iter().collect() }
    }
}

/// Parse INI text into [`Settings`].
///
/// Keys are lower-cased and the last duplicate wins. Values are kept verbatim
/// (trimmed, no quote or escape processing). `[DEFAULT]` keys are copied into
/// every other section that does not set them. A key before the first section
/// header is an error.
pub fn parse_settings(text: &str) -> Result<Settings, ConfigError> {
    parse_ini(text).and_then(|ini| settings_from_ini(&ini))
}

/// Parse INI text with values left verbatim.
fn parse_ini(text: &str) -> Result<Ini, ConfigError> {
    let opt = ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        enabled_indented_mutiline_value: true,
        ..ParseOption::default()
    };
    Ini::load_from_str_opt(text, opt).map_err(|source| ConfigError::Parse {
        path: error::inline_source(),
        source,
    })
}

fn settings_from_ini(ini: &Ini) -> Result<Settings, ConfigError> {
    let mut sections: BTreeMap<String, Section> = BTreeMap::new();
    let mut defaults = Section::new();

    for (name, props) in ini.iter() {
        let Some(name) = name else {
            if let Some((key, _)) = props.iter().next() {
                return Err(ConfigError::MissingSectionHeader {
                    path: error::inline_source(),
                    key: key.to_string(),
                });
            }
            continue;
        };

        let target = if name == DEFAULT_SECTION {
            &mut defaults
        } else {
            sections.entry(name.to_string()).or_default()
        };
        for (key, value) in props.iter() {
            if key.contains('\n') || key.is_empty() {
                return Err(ConfigError::MalformedLine {
                    path: error::inline_source(),
                    key: key.lines().next().unwrap_or_default().trim().to_string(),
                });
            }
            target.insert(key.to_lowercase(), value.to_string());
        }
    }

    if !defaults.is_empty() {
        for section in sections.values_mut() {
            for (key, value) in &defaults {
                section.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }

    Ok(Settings { sections })
}

/// Fails with [`ConfigError::MissingFile`] unless `path` is an existing regular file.
pub(crate) fn ensure_regular_file(path: &Path) -> Result<(), ConfigError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(ConfigError::MissingFile { path: path.to_path_buf() }),
    }
}

fn read_settings(path: &Path) -> Result<Settings, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_settings(&raw).map_err(|e| e.with_path(path))
}

/// Caller-owned settings cache.
///
/// Mutating operations take `&mut self`; share a store between threads by
/// wrapping it in a lock.
#[derive(Debug)]
pub struct ConfigStore<O: LoadObserver = TracingObserver> {
    default_path: PathBuf,
    cache: Option<Settings>,
    observer: O,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self {
            default_path: PathBuf::from(DEFAULT_CONFIG_FILE),
            cache: None,
            observer: TracingObserver,
        }
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: LoadObserver> ConfigStore<O> {
    /// Replace the observer. The cache is carried over.
    pub fn with_observer<P: LoadObserver>(self, observer: P) -> ConfigStore<P> {
        ConfigStore {
            default_path: self.default_path,
            cache: self.cache,
            observer,
        }
    }

    /// Path used by [`load_default`](Self::load_default) and [`get`](Self::get).
    pub fn with_default_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_path = path.into();
        self
    }

    pub fn default_path(&self) -> &Path {
        &self.default_path
    }

    /// Load `path`, replacing the cache on success.
    ///
    /// A missing file leaves the cache untouched. A read or parse failure
    /// clears it.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<&Settings, ConfigError> {
        let path = path.as_ref();

        if let Err(error) = ensure_regular_file(path) {
            self.observer
                .on_event(Component::Settings, &LoadEvent::Missing { path, error: &error });
            return Err(error);
        }

        match read_settings(path) {
            Ok(settings) => {
                let settings: &Settings = self.cache.insert(settings);
                self.observer.on_event(Component::Settings, &LoadEvent::Loaded { path });
                Ok(settings)
            }
            Err(error) => {
                self.cache = None;
                self.observer
                    .on_event(Component::Settings, &LoadEvent::Failed { path, error: &error });
                Err(error)
            }
        }
    }

    pub fn load_default(&mut self) -> Result<&Settings, ConfigError> {
        let path = self.default_path.clone();
        self.load(path)
    }

    /// Cached settings, loading the default path first if nothing is cached.
    pub fn get(&mut self) -> Result<&Settings, ConfigError> {
        match self.cache {
            Some(ref settings) => Ok(settings),
            None => self.load_default(),
        }
    }

    /// Drop the cached settings. Idempotent.
    pub fn reset(&mut self) {
        self.cache = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.cache.is_some()
    }

    /// Cached settings without triggering a load.
    pub fn cached(&self) -> Option<&Settings> {
        self.cache.as_ref()
    }
}

/// Expand a leading `~` (alone or followed by `/`) to the home directory.
/// Used for paths taken from the environment.
pub fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}
