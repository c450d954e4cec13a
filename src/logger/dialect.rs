//! Logging configuration dialect.
//!
//! The file is INI with a fixed layout:
//!
//! ```text
//! [loggers]            keys=root,audit
//! [handlers]           keys=console,file
//! [formatters]         keys=plain
//! [logger_root]        level=INFO, handlers=console
//! [logger_audit]       level=DEBUG, handlers=file, qualname=diffdibb.audit
//! [handler_console]    class=StreamHandler, level=DEBUG, formatter=plain, args=(sys.stderr,)
//! [handler_file]       class=FileHandler, args=('/var/log/diffdibb.log', 'a')
//! [formatter_plain]    format=%(message)s, style=%, layout=compact, target=true, ansi=false
//! ```
//!
//! Dotted `qualname`s become `::`-separated tracing targets. `format`,
//! `datefmt` and `style` (`%`, `{` or `$`) are checked but not used; `layout`
//! picks the tracing formatter.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::level_filters::LevelFilter;

use crate::config::{Section, Settings, parse_settings};
use crate::error::{self, ConfigError};

/// Parsed logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSpec {
    /// Level of the root logger. Defaults to `WARN`.
    pub root: LevelFilter,
    /// Per-target levels from non-root loggers. `None` is an explicit
    /// `NOTSET`: the target goes back to following the root level.
    pub targets: BTreeMap<String, Option<LevelFilter>>,
    /// Handlers referenced by at least one logger, in `[handlers]` order.
    pub outputs: Vec<OutputSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub name: String,
    pub destination: Destination,
    /// Most verbose level this output writes. `TRACE` means no limit.
    pub level: LevelFilter,
    pub format: FormatSpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Stderr,
    Stdout,
    File { path: PathBuf, append: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    #[default]
    Full,
    Compact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSpec {
    pub layout: Layout,
    pub target: bool,
    pub ansi: bool,
}

impl Default for FormatSpec {
    fn default() -> Self {
        Self { layout: Layout::Full, target: true, ansi: false }
    }
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidLogging { path: error::inline_source(), reason: reason.into() }
}

/// Parse a level name. Accepts the classic names (`CRITICAL`, `WARNING`,
/// `NOTSET`, ...) as well as tracing's own, case-insensitively. `NOTSET`
/// maps to `TRACE`.
pub fn parse_level(level: &str) -> Result<LevelFilter, ConfigError> {
    let level = level.trim();
    if level.is_empty() {
        return Err(invalid("log level must not be empty"));
    }
    match level.to_ascii_lowercase().as_str() {
        "critical" | "fatal" | "error" => Ok(LevelFilter::ERROR),
        "warning" | "warn" => Ok(LevelFilter::WARN),
        "info" => Ok(LevelFilter::INFO),
        "debug" => Ok(LevelFilter::DEBUG),
        "trace" | "notset" => Ok(LevelFilter::TRACE),
        "off" => Ok(LevelFilter::OFF),
        _ => Err(invalid(format!("unrecognised log level: '{level}'"))),
    }
}

fn is_notset(level: &str) -> bool {
    level.trim().eq_ignore_ascii_case("notset")
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        other => Err(invalid(format!("'{key}' expects a boolean, got '{other}'"))),
    }
}

/// Comma-separated list, blanks dropped.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn keys(settings: &Settings, section: &str) -> Result<Vec<String>, ConfigError> {
    let section = settings
        .section(section)
        .ok_or_else(|| invalid(format!("missing [{section}] section")))?;
    Ok(section.get("keys").map(|v| split_list(v)).unwrap_or_default())
}

fn section<'a>(settings: &'a Settings, name: &str) -> Result<&'a Section, ConfigError> {
    settings
        .section(name)
        .ok_or_else(|| invalid(format!("missing [{name}] section")))
}

/// Split `('a', 'w')` style argument tuples. Quotes protect commas.
fn split_args(args: &str) -> Vec<String> {
    let inner = args.trim();
    let inner = inner
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(inner);

    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for ch in inner.chars() {
        match (quote, ch) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (None, '\'' | '"') => {
                quote = Some(ch);
                current.push(ch);
            }
            (None, ',') => out.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    out.push(current);
    out.into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn unquote(value: &str) -> Option<&str> {
    let value = value.trim();
    ['\'', '"'].into_iter().find_map(|q| {
        value.strip_prefix(q).and_then(|rest| rest.strip_suffix(q))
    })
}

fn parse_destination(name: &str, class: &str, args: &str) -> Result<Destination, ConfigError> {
    let class = class.trim();
    let class = class.strip_prefix("logging.").unwrap_or(class);
    let args = split_args(args);

    match class {
        "StreamHandler" => match args.first().map(String::as_str) {
            None | Some("sys.stderr") => Ok(Destination::Stderr),
            Some("sys.stdout") => Ok(Destination::Stdout),
            Some(other) => Err(invalid(format!(
                "handler '{name}': unsupported stream '{other}'"
            ))),
        },
        "FileHandler" => {
            let path = args
                .first()
                .and_then(|a| unquote(a))
                .ok_or_else(|| invalid(format!("handler '{name}': FileHandler needs a quoted path")))?;
            let append = match args.get(1).map(|m| unquote(m).unwrap_or(m)) {
                None | Some("a") => true,
                Some("w") => false,
                Some(other) => {
                    return Err(invalid(format!(
                        "handler '{name}': unsupported file mode '{other}'"
                    )));
                }
            };
            Ok(Destination::File { path: PathBuf::from(path), append })
        }
        other => Err(invalid(format!("handler '{name}': unsupported class '{other}'"))),
    }
}

fn parse_format(settings: &Settings, name: &str) -> Result<FormatSpec, ConfigError> {
    let section = section(settings, &format!("formatter_{name}"))?;
    let mut format = FormatSpec::default();
    if let Some(style) = section.get("style") {
        let style = style.trim();
        if !matches!(style, "%" | "{" | "$") {
            return Err(invalid(format!(
                "formatter '{name}': style must be one of '%', '{{', '$', got '{style}'"
            )));
        }
    }
    if let Some(layout) = section.get("layout") {
        format.layout = match layout.trim().to_ascii_lowercase().as_str() {
            "full" => Layout::Full,
            "compact" => Layout::Compact,
            other => {
                return Err(invalid(format!("formatter '{name}': unknown layout '{other}'")));
            }
        };
    }
    if let Some(target) = section.get("target") {
        format.target = parse_bool("target", target)?;
    }
    if let Some(ansi) = section.get("ansi") {
        format.ansi = parse_bool("ansi", ansi)?;
    }
    Ok(format)
}

impl LoggingSpec {
    /// Parse logging configuration text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let settings = parse_settings(text)?;
        Self::from_settings(&settings)
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let logger_ids = keys(settings, "loggers")?;
        let handler_ids = keys(settings, "handlers")?;
        let formatter_ids = match settings.section("formatters") {
            Some(_) => keys(settings, "formatters")?,
            None => Vec::new(),
        };

        if !logger_ids.iter().any(|id| id == "root") {
            return Err(invalid("[loggers] keys must include 'root'"));
        }

        let mut root = LevelFilter::WARN;
        let mut targets = BTreeMap::new();
        let mut referenced: Vec<String> = Vec::new();

        for id in &logger_ids {
            let section = section(settings, &format!("logger_{id}"))?;

            if let Some(handlers) = section.get("handlers") {
                for handler in split_list(handlers) {
                    if !handler_ids.contains(&handler) {
                        return Err(invalid(format!(
                            "logger '{id}' references undeclared handler '{handler}'"
                        )));
                    }
                    if !referenced.contains(&handler) {
                        referenced.push(handler);
                    }
                }
            }

            if id == "root" {
                if let Some(level) = section.get("level") {
                    root = parse_level(level)?;
                }
                continue;
            }

            let qualname = section
                .get("qualname")
                .map(|q| q.trim())
                .filter(|q| !q.is_empty())
                .ok_or_else(|| invalid(format!("logger '{id}' has no qualname")))?;
            let target = qualname.replace('.', "::");
            match section.get("level") {
                Some(level) if is_notset(level) => {
                    targets.insert(target, None);
                }
                Some(level) => {
                    targets.insert(target, Some(parse_level(level)?));
                }
                None => {}
            }
        }

        let mut outputs = Vec::new();
        for id in &handler_ids {
            let section = section(settings, &format!("handler_{id}"))?;
            if !referenced.contains(id) {
                continue;
            }

            let class = section
                .get("class")
                .ok_or_else(|| invalid(format!("handler '{id}' has no class")))?;
            let args = section.get("args").map(String::as_str).unwrap_or("()");
            let destination = parse_destination(id, class, args)?;

            let level = match section.get("level") {
                Some(level) => parse_level(level)?,
                None => LevelFilter::TRACE,
            };

            let format = match section.get("formatter").map(|f| f.trim()) {
                Some(name) if !name.is_empty() => {
                    if !formatter_ids.iter().any(|f| f == name) {
                        return Err(invalid(format!(
                            "handler '{id}' references undeclared formatter '{name}'"
                        )));
                    }
                    parse_format(settings, name)?
                }
                _ => FormatSpec::default(),
            };

            outputs.push(OutputSpec { name: id.clone(), destination, level, format });
        }

        Ok(Self { root, targets, outputs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[loggers]
keys = root, audit, quiet

[handlers]
keys = console, file, unused

[formatters]
keys = plain

[logger_root]
level = INFO
handlers = console

[logger_audit]
level = DEBUG
handlers = console, file
qualname = diffdibb.audit
propagate = 0

[logger_quiet]
level = NOTSET
handlers =
qualname = diffdibb.quiet

[handler_console]
class = StreamHandler
level = WARNING
formatter = plain
args = (sys.stdout,)

[handler_file]
class = logging.FileHandler
args = ('/var/log/diffdibb, audit.log', 'w')

[handler_unused]
class = StreamHandler

[formatter_plain]
format = %(asctime)s %(message)s
style = %
layout = compact
ansi = yes
target = off
"#;

    #[test]
    fn parses_full_configuration() {
        let spec = LoggingSpec::parse(FULL).unwrap();
        assert_eq!(spec.root, LevelFilter::INFO);
        assert_eq!(spec.targets.len(), 2);
        assert_eq!(spec.targets["diffdibb::audit"], Some(LevelFilter::DEBUG));
        assert_eq!(spec.targets["diffdibb::quiet"], None);

        assert_eq!(spec.outputs.len(), 2);
        let console = &spec.outputs[0];
        assert_eq!(console.name, "console");
        assert_eq!(console.destination, Destination::Stdout);
        assert_eq!(console.level, LevelFilter::WARN);
        assert_eq!(console.format, FormatSpec { layout: Layout::Compact, target: false, ansi: true });

        let file = &spec.outputs[1];
        assert_eq!(
            file.destination,
            Destination::File { path: PathBuf::from("/var/log/diffdibb, audit.log"), append: false }
        );
        assert_eq!(file.level, LevelFilter::TRACE);
        assert_eq!(file.format, FormatSpec::default());
    }

    #[test]
    fn root_defaults_to_warn() {
        let text = "[loggers]\nkeys=root\n[handlers]\nkeys=\n[logger_root]\n";
        let spec = LoggingSpec::parse(text).unwrap();
        assert_eq!(spec.root, LevelFilter::WARN);
        assert!(spec.outputs.is_empty());
    }

    #[test]
    fn missing_root_logger_is_invalid() {
        let text = "[loggers]\nkeys=app\n[handlers]\nkeys=\n[logger_app]\nqualname=app\n";
        let err = LoggingSpec::parse(text).unwrap_err();
        assert!(err.to_string().contains("'root'"), "got {err}");
    }

    #[test]
    fn missing_logger_section_is_invalid() {
        let text = "[loggers]\nkeys=root\n[handlers]\nkeys=\n";
        let err = LoggingSpec::parse(text).unwrap_err();
        assert!(err.to_string().contains("[logger_root]"), "got {err}");
    }

    #[test]
    fn undeclared_handler_is_invalid() {
        let text = "[loggers]\nkeys=root\n[handlers]\nkeys=\n[logger_root]\nhandlers=console\n";
        let err = LoggingSpec::parse(text).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLogging { .. }));
        assert!(err.to_string().contains("'console'"));
    }

    #[test]
    fn logger_without_qualname_is_invalid() {
        let text = "[loggers]\nkeys=root,app\n[handlers]\nkeys=\n[logger_root]\n[logger_app]\nlevel=INFO\n";
        let err = LoggingSpec::parse(text).unwrap_err();
        assert!(err.to_string().contains("qualname"));
    }

    #[test]
    fn unsupported_handler_class_is_invalid() {
        let text = "[loggers]\nkeys=root\n[handlers]\nkeys=h\n[logger_root]\nhandlers=h\n\
                    [handler_h]\nclass=handlers.SysLogHandler\n";
        let err = LoggingSpec::parse(text).unwrap_err();
        assert!(err.to_string().contains("SysLogHandler"));
    }

    #[test]
    fn undeclared_formatter_is_invalid() {
        let text = "[loggers]\nkeys=root\n[handlers]\nkeys=h\n[logger_root]\nhandlers=h\n\
                    [handler_h]\nclass=StreamHandler\nformatter=fancy\n";
        let err = LoggingSpec::parse(text).unwrap_err();
        assert!(err.to_string().contains("'fancy'"));
    }

    #[test]
    fn brace_style_formatter_is_accepted() {
        let text = "[loggers]\nkeys=root\n[handlers]\nkeys=console\n[formatters]\nkeys=simple\n\
                    [logger_root]\nlevel=INFO\nhandlers=console\n\
                    [handler_console]\nclass=StreamHandler\nformatter=simple\nargs=(sys.stderr,)\n\
                    [formatter_simple]\nformat={asctime} {message}\nstyle={\ndatefmt=%H:%M\n";
        let spec = LoggingSpec::parse(text).unwrap();
        assert_eq!(spec.outputs[0].format, FormatSpec::default());
    }

    #[test]
    fn unknown_format_style_is_invalid() {
        let text = "[loggers]\nkeys=root\n[handlers]\nkeys=h\n[formatters]\nkeys=f\n\
                    [logger_root]\nhandlers=h\n[handler_h]\nclass=StreamHandler\nformatter=f\n\
                    [formatter_f]\nstyle=@\n";
        let err = LoggingSpec::parse(text).unwrap_err();
        assert!(err.to_string().contains("style must be one of"), "got {err}");
    }

    #[test]
    fn unknown_layout_is_invalid() {
        let text = "[loggers]\nkeys=root\n[handlers]\nkeys=h\n[formatters]\nkeys=f\n\
                    [logger_root]\nhandlers=h\n[handler_h]\nclass=StreamHandler\nformatter=f\n\
                    [formatter_f]\nlayout=pretty\n";
        let err = LoggingSpec::parse(text).unwrap_err();
        assert!(err.to_string().contains("unknown layout 'pretty'"), "got {err}");
    }

    #[test]
    fn logger_without_level_sets_nothing() {
        let text = "[loggers]\nkeys=root,app\n[handlers]\nkeys=\n[logger_root]\n\
                    [logger_app]\nqualname=app.db\n";
        let spec = LoggingSpec::parse(text).unwrap();
        assert!(spec.targets.is_empty());
    }

    #[test]
    fn stream_handler_defaults_to_stderr() {
        assert_eq!(parse_destination("h", "StreamHandler", "()").unwrap(), Destination::Stderr);
        assert_eq!(
            parse_destination("h", "StreamHandler", "(sys.stderr,)").unwrap(),
            Destination::Stderr
        );
    }

    #[test]
    fn file_handler_defaults_to_append() {
        let dest = parse_destination("h", "FileHandler", "(\"audit.log\",)").unwrap();
        assert_eq!(dest, Destination::File { path: PathBuf::from("audit.log"), append: true });
    }

    #[test]
    fn valid_levels_parse() {
        for l in &["error", "warn", "info", "debug", "trace", "CRITICAL", "WARNING", "NOTSET", "off"] {
            assert!(parse_level(l).is_ok(), "expected '{l}' to be valid");
        }
        assert_eq!(parse_level("critical").unwrap(), LevelFilter::ERROR);
        assert_eq!(parse_level("NOTSET").unwrap(), LevelFilter::TRACE);
    }

    #[test]
    fn invalid_level_errors() {
        assert!(parse_level("verbose").is_err());
        assert!(parse_level("").is_err());
        assert!(parse_level("INFO_LEVEL").is_err());
    }

    #[test]
    fn split_args_respects_quotes() {
        assert_eq!(split_args("('a,b', 'w')"), vec!["'a,b'", "'w'"]);
        assert_eq!(split_args("()"), Vec::<String>::new());
        assert_eq!(split_args("(sys.stdout,)"), vec!["sys.stdout"]);
    }
}
