//! # Logging Utilities
//!
//! Logging initialisation for the Ferros binaries, built on `tracing`.
//!
//! There are two modes:
//!
//! - [`init_logging`] for the headless server: logs go to stdout, and also to
//!   a daily-rotated file when `FERROS_LOG_FILE` is set
//! - [`init_logging_for_terminal`] for the interactive front-end: logs go to a
//!   file only, so nothing interleaves with the prompt
//!
//! Both return a [`LogGuard`] that must be held until the program exits, or
//! buffered file output is lost.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ferros_utils::init_logging;
//!
//! let _guard = init_logging(None).expect("Failed to initialize logging");
//! tracing::info!("Server started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Level filter (e.g., `RUST_LOG=debug`, `RUST_LOG=ferros_core=debug`)
//! - `FERROS_LOG_FORMAT`: Output format (`json` or `pretty`, default: `pretty`)
//! - `FERROS_LOG_FILE`: Log file path. Optional for the server; overrides the
//!   dated default for the terminal

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::{NaiveDate, Utc};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::ferros_dir;

const FORMAT_VAR: &str = "FERROS_LOG_FORMAT";
const FILE_VAR: &str = "FERROS_LOG_FILE";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat
{
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(Self::Pretty),
            "json" | "prod" | "production" => Ok(Self::Json),
            _ => Err(LoggingError::InvalidFormat(s.to_string())),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" | "dbg" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(LoggingError::InvalidLevel(s.to_string())),
        }
    }
}

impl fmt::Display for LogLevel
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::Display::fmt(&Level::from(*self), f)
    }
}

/// Keeps the background file writer alive. Dropping it flushes and stops
/// file output.
#[must_use = "logs written to a file are lost once the guard is dropped"]
#[derive(Debug, Default)]
pub struct LogGuard
{
    _file: Option<WorkerGuard>,
}

/// Initialize logging for the headless server.
///
/// `level` (from `--log-level`) wins over `RUST_LOG`; without either the
/// level is `info`.
///
/// ## Errors
///
/// Returns an error if:
/// - Logging is already initialized
/// - `FERROS_LOG_FORMAT` holds an unknown format
/// - `FERROS_LOG_FILE` is set and the file cannot be created
pub fn init_logging(level: Option<LogLevel>) -> Result<LogGuard, LoggingError>
{
    let format = format_from_env()?;
    let mut layers = vec![fmt_layer(format, io::stdout, true)];

    let mut guard = LogGuard::default();
    if let Some(path) = env::var_os(FILE_VAR).map(PathBuf::from) {
        let (writer, file_guard) = file_writer(&path, Rotation::DAILY)?;
        layers.push(fmt_layer(format, writer, false));
        guard._file = Some(file_guard);
    }

    install(layers, build_filter(level))?;
    Ok(guard)
}

/// Initialize file-only logging for the interactive terminal.
///
/// The file is `FERROS_LOG_FILE` when set, otherwise
/// `~/.ferros/YYYY-MM-DD-ferros.log` (or the temp directory when there is
/// no home directory). Returns the path written to.
///
/// ## Errors
///
/// Returns an error if logging is already initialized or the file cannot be
/// created.
pub fn init_logging_for_terminal(level: Option<LogLevel>) -> Result<(PathBuf, LogGuard), LoggingError>
{
    let format = format_from_env()?;
    let path = env::var_os(FILE_VAR).map_or_else(
        || {
            let dir = ferros_dir().unwrap_or_else(env::temp_dir);
            dir.join(log_file_name(Utc::now().date_naive()))
        },
        PathBuf::from,
    );

    // The date is already in the file name.
    let (writer, file_guard) = file_writer(&path, Rotation::NEVER)?;
    install(vec![fmt_layer(format, writer, false)], build_filter(level))?;

    Ok((path, LogGuard { _file: Some(file_guard) }))
}

fn log_file_name(date: NaiveDate) -> String
{
    format!("{}-ferros.log", date.format("%Y-%m-%d"))
}

fn format_from_env() -> Result<LogFormat, LoggingError>
{
    env::var(FORMAT_VAR).map_or(Ok(LogFormat::default()), |value| value.parse())
}

/// Explicit level, then `RUST_LOG`, then `info`.
fn build_filter(explicit: Option<LogLevel>) -> EnvFilter
{
    if let Some(level) = explicit {
        return EnvFilter::new(level.to_string());
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()))
}

fn fmt_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_ansi(ansi);

    match format {
        LogFormat::Pretty => layer.boxed(),
        LogFormat::Json => layer.json().with_current_span(true).with_span_list(true).boxed(),
    }
}

fn file_writer(
    path: &Path,
    rotation: Rotation,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), LoggingError>
{
    let name = path
        .file_name()
        .ok_or_else(|| LoggingError::InvalidPath(path.to_path_buf()))?
        .to_string_lossy()
        .into_owned();
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(name)
        .build(dir)
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;
    Ok(tracing_appender::non_blocking(appender))
}

fn install(layers: Vec<BoxedLayer>, filter: EnvFilter) -> Result<(), LoggingError>
{
    Registry::default()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    #[error("Unknown log format: {0}. Use 'pretty' or 'json'")]
    InvalidFormat(String),

    #[error("Unknown log level: {0}. Use 'error', 'warn', 'info', 'debug', or 'trace'")]
    InvalidLevel(String),

    #[error("Log file path has no file name: {0}")]
    InvalidPath(PathBuf),

    /// A subscriber is already installed, or the appender failed.
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_log_format_from_str()
    {
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("prod").unwrap(), LogFormat::Json);
        assert!(matches!(LogFormat::from_str("xml"), Err(LoggingError::InvalidFormat(_))));
    }

    #[test]
    fn test_log_level_from_str()
    {
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("dbg").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("trace").unwrap(), LogLevel::Trace);
        assert!(matches!(LogLevel::from_str("loud"), Err(LoggingError::InvalidLevel(_))));
    }

    #[test]
    fn test_log_level_display_matches_tracing()
    {
        assert_eq!(LogLevel::Debug.to_string(), "DEBUG");
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
    }

    #[test]
    fn test_explicit_level_wins()
    {
        let filter = build_filter(Some(LogLevel::Trace));
        assert_eq!(filter.max_level_hint(), Some(tracing::level_filters::LevelFilter::TRACE));
    }

    #[test]
    fn test_dated_log_file_name()
    {
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(log_file_name(date), "2025-03-09-ferros.log");
    }

    #[test]
    fn test_file_writer_rejects_bare_root()
    {
        assert!(matches!(file_writer(Path::new("/"), Rotation::NEVER), Err(LoggingError::InvalidPath(_))));
    }
}
