//! Logging bootstrap via tracing-subscriber.
//!
//! The first successful [`LoggingBootstrap::load`] (or [`init_fallback`])
//! installs a global subscriber whose filter and outputs sit behind reload
//! handles. Later calls swap them in place, so the subscriber can be
//! reconfigured any number of times.
//!
//! Reconfiguration is additive: a target level set by an earlier file stays in
//! force until a later file sets that target again. The root level and the
//! outputs are replaced on every load.

mod dialect;

pub use dialect::{Destination, FormatSpec, Layout, LoggingSpec, OutputSpec, parse_level};

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriter, MakeWriterExt};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, reload};

use crate::config::ensure_regular_file;
use crate::error::ConfigError;
use crate::observe::{Component, LoadEvent, LoadObserver, TracingObserver};

/// Default location of the logging configuration file.
pub const DEFAULT_LOGGING_CONFIG_FILE: &str = "/etc/diffdibb/logging.conf";

type OutputLayer = Box<dyn Layer<Registry> + Send + Sync>;
type OutputReload = reload::Layer<OutputLayer, Registry>;
type FilterHandle = reload::Handle<EnvFilter, Layered<OutputReload, Registry>>;
type OutputHandle = reload::Handle<OutputLayer, Registry>;

/// Accumulated filter state across loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directives {
    pub root: LevelFilter,
    pub targets: BTreeMap<String, LevelFilter>,
}

impl Directives {
    pub fn new(root: LevelFilter) -> Self {
        Self { root, targets: BTreeMap::new() }
    }

    /// Take the root level from `spec` and add its targets on top of ours.
    /// A `NOTSET` target in `spec` drops our entry for it.
    pub fn merge(&mut self, spec: &LoggingSpec) {
        self.root = spec.root;
        for (target, level) in &spec.targets {
            match level {
                Some(level) => {
                    self.targets.insert(target.clone(), *level);
                }
                None => {
                    self.targets.remove(target);
                }
            }
        }
    }

    /// `EnvFilter` directive string, e.g. `warn,diffdibb::audit=debug`.
    pub fn to_directive_string(&self) -> String {
        let mut out = level_name(self.root);
        for (target, level) in &self.targets {
            out.push_str(&format!(",{target}={}", level_name(*level)));
        }
        out
    }

    fn to_filter(&self) -> Result<EnvFilter, ConfigError> {
        let directives = self.to_directive_string();
        EnvFilter::try_new(&directives)
            .map_err(|e| ConfigError::Subscriber(format!("invalid filter '{directives}': {e}")))
    }
}

fn level_name(level: LevelFilter) -> String {
    level.to_string().to_ascii_lowercase()
}

struct Installed {
    filter: FilterHandle,
    output: OutputHandle,
    directives: Directives,
}

static INSTALLED: Mutex<Option<Installed>> = Mutex::new(None);

fn installed() -> std::sync::MutexGuard<'static, Option<Installed>> {
    match INSTALLED.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Current accumulated directives, or `None` before the first install.
pub fn current_directives() -> Option<Directives> {
    installed().as_ref().map(|i| i.directives.clone())
}

fn boxed_writer<M>(writer: M, level: LevelFilter) -> Option<BoxMakeWriter>
where
    M: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    match level.into_level() {
        None => None,
        Some(max) if max == Level::TRACE => Some(BoxMakeWriter::new(writer)),
        Some(max) => Some(BoxMakeWriter::new(writer.with_max_level(max))),
    }
}

fn make_writer(output: &OutputSpec) -> Result<Option<BoxMakeWriter>, ConfigError> {
    match &output.destination {
        Destination::Stderr => Ok(boxed_writer(std::io::stderr, output.level)),
        Destination::Stdout => Ok(boxed_writer(std::io::stdout, output.level)),
        Destination::File { path, append } => {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .append(*append)
                .truncate(!*append)
                .open(path)
                .map_err(|source| ConfigError::OpenLogFile { path: path.clone(), source })?;
            Ok(boxed_writer(Mutex::new(file), output.level))
        }
    }
}

fn fmt_layer(writer: BoxMakeWriter, format: FormatSpec) -> OutputLayer {
    let layer = fmt::layer::<Registry>()
        .with_writer(writer)
        .with_ansi(format.ansi)
        .with_target(format.target);
    match format.layout {
        Layout::Full => layer.boxed(),
        Layout::Compact => layer.compact().boxed(),
    }
}

/// Build one layer writing to every output. Outputs at `OFF` are dropped.
fn build_outputs(outputs: &[OutputSpec]) -> Result<OutputLayer, ConfigError> {
    let mut layers: Vec<OutputLayer> = Vec::with_capacity(outputs.len());
    for output in outputs {
        if let Some(writer) = make_writer(output)? {
            layers.push(fmt_layer(writer, output.format));
        }
    }
    Ok(layers.boxed())
}

/// Install the global subscriber, or reload it if this module already did.
fn apply(filter: EnvFilter, output: OutputLayer, directives: Directives) -> Result<(), ConfigError> {
    let mut guard = installed();
    match guard.as_mut() {
        Some(current) => {
            current
                .output
                .reload(output)
                .map_err(|e| ConfigError::Subscriber(format!("failed to reload outputs: {e}")))?;
            current
                .filter
                .reload(filter)
                .map_err(|e| ConfigError::Subscriber(format!("failed to reload filter: {e}")))?;
            current.directives = directives;
        }
        None => {
            let (output_layer, output_handle) = reload::Layer::new(output);
            let (filter_layer, filter_handle) = reload::Layer::new(filter);
            tracing_subscriber::registry()
                .with(output_layer)
                .with(filter_layer)
                .try_init()
                .map_err(|e| ConfigError::Subscriber(format!("failed to set subscriber: {e}")))?;
            *guard = Some(Installed {
                filter: filter_handle,
                output: output_handle,
                directives,
            });
        }
    }
    Ok(())
}

/// Apply a parsed logging configuration to the process.
pub fn apply_spec(spec: &LoggingSpec) -> Result<(), ConfigError> {
    let mut directives = current_directives().unwrap_or_else(|| Directives::new(spec.root));
    directives.merge(spec);
    let filter = directives.to_filter()?;
    let output = build_outputs(&spec.outputs)?;
    apply(filter, output, directives)
}

/// Install a stderr subscriber before any logging configuration is known.
///
/// `level` accepts the same names as [`parse_level`]. If `prefer_level` is
/// `true`, `level` takes precedence and `RUST_LOG` is only used as a fallback
/// when `level` is invalid. If `prefer_level` is `false`, `RUST_LOG` takes
/// precedence and `level` is the fallback. Accumulated target levels from
/// earlier loads are kept.
pub fn init_fallback(level: &str, prefer_level: bool) -> Result<(), ConfigError> {
    let (filter, root) = match (prefer_level, parse_level(level)) {
        (true, Ok(root)) => (None, root),
        (false, Ok(root)) => (EnvFilter::try_from_default_env().ok(), root),
        (_, Err(level_err)) => {
            let filter = EnvFilter::try_from_default_env().map_err(|env_err| {
                ConfigError::Subscriber(format!(
                    "invalid log level '{level}': {level_err}; RUST_LOG parse failed: {env_err}"
                ))
            })?;
            (Some(filter), LevelFilter::WARN)
        }
    };

    let mut directives = current_directives().unwrap_or_else(|| Directives::new(root));
    directives.root = root;
    let filter = match filter {
        Some(filter) => filter,
        None => directives.to_filter()?,
    };
    let output = build_outputs(&[OutputSpec {
        name: "fallback".into(),
        destination: Destination::Stderr,
        level: LevelFilter::TRACE,
        format: FormatSpec::default(),
    }])?;
    apply(filter, output, directives)
}

fn apply_file(path: &Path) -> Result<(), ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let spec = LoggingSpec::parse(&raw).map_err(|e| e.with_path(path))?;
    apply_spec(&spec)
}

/// Applies logging configuration files to the process-wide subscriber.
#[derive(Debug, Clone)]
pub struct LoggingBootstrap<O: LoadObserver = TracingObserver> {
    default_path: PathBuf,
    observer: O,
}

impl LoggingBootstrap {
    pub fn new() -> Self {
        Self {
            default_path: PathBuf::from(DEFAULT_LOGGING_CONFIG_FILE),
            observer: TracingObserver,
        }
    }
}

impl Default for LoggingBootstrap {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: LoadObserver> LoggingBootstrap<O> {
    pub fn with_observer<P: LoadObserver>(self, observer: P) -> LoggingBootstrap<P> {
        LoggingBootstrap { default_path: self.default_path, observer }
    }

    pub fn with_default_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_path = path.into();
        self
    }

    pub fn default_path(&self) -> &Path {
        &self.default_path
    }

    /// Apply the logging configuration at `path`.
    ///
    /// The outcome is reported after the new configuration is in place, so
    /// the success record goes through the freshly configured outputs.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Err(error) = ensure_regular_file(path) {
            self.observer
                .on_event(Component::Logging, &LoadEvent::Missing { path, error: &error });
            return Err(error);
        }

        match apply_file(path) {
            Ok(()) => {
                self.observer.on_event(Component::Logging, &LoadEvent::Loaded { path });
                Ok(())
            }
            Err(error) => {
                self.observer
                    .on_event(Component::Logging, &LoadEvent::Failed { path, error: &error });
                Err(error)
            }
        }
    }

    pub fn load_default(&self) -> Result<(), ConfigError> {
        self.load(&self.default_path)
    }
}
