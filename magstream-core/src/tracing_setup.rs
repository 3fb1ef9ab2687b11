//! Logging for the magstream binaries
//!
//! The console carries the chosen level for magstream crates and warnings
//! from the HTTP stack. Each run also records a full trace to
//! `<logs_dir>/magstream-last-run.log`, replacing the previous run's file,
//! so session lifecycle and transfer outcomes can be inspected afterwards.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::ValueEnum;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File name of the full-trace log inside the logs directory.
pub const LOG_FILE_NAME: &str = "magstream-last-run.log";

/// Directory used when no logs directory is given.
pub const DEFAULT_LOGS_DIR: &str = "logs";

const MAGSTREAM_TARGETS: [&str; 4] = [
    "magstream",
    "magstream_core",
    "magstream_search",
    "magstream_web",
];

const HTTP_STACK_TARGETS: [&str; 4] = ["hyper", "hyper_util", "reqwest", "tower_http"];

/// Console filter: `level` for magstream crates, warnings for everything else.
pub fn console_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = vec!["warn".to_string()];
    directives.extend(MAGSTREAM_TARGETS.iter().map(|target| format!("{target}={level}")));
    directives.extend(HTTP_STACK_TARGETS.iter().map(|target| format!("{target}=warn")));
    directives.join(",")
}

/// Trace file filter: everything from magstream crates, debug from the rest.
pub fn trace_file_directives() -> String {
    let mut directives = vec!["debug".to_string()];
    directives.extend(MAGSTREAM_TARGETS.iter().map(|target| format!("{target}=trace")));
    directives.join(",")
}

/// Installs the console layer and the last-run trace file layer.
///
/// `RUST_LOG`, when set, replaces the console filter. Returns the path of the
/// trace file.
///
/// # Errors
/// - `Box<dyn std::error::Error>` - Logs directory or trace file cannot be
///   created, or `RUST_LOG` holds invalid directives
pub fn init_tracing(
    console_level: Level,
    logs_dir: Option<&Path>,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let logs_dir = logs_dir.unwrap_or_else(|| Path::new(DEFAULT_LOGS_DIR));
    create_dir_all(logs_dir)?;
    let trace_path = logs_dir.join(LOG_FILE_NAME);
    let trace_file = File::create(&trace_path)?;

    let console_filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) => EnvFilter::try_new(directives)?,
        Err(_) => EnvFilter::try_new(console_directives(console_level))?,
    };

    let console_layer = fmt::layer()
        .with_target(true)
        .compact()
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(Mutex::new(trace_file))
        .with_filter(EnvFilter::try_new(trace_file_directives())?);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(
        "Logging at {} to console, full trace in {}",
        console_level,
        trace_path.display()
    );

    Ok(trace_path)
}

/// Console log level selectable with `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliLogLevel {
    /// Only errors
    Error,
    /// Failed transfers, evictions of failed sessions and errors
    Warn,
    /// Session joins, evictions and served files
    Info,
    /// Cache hits, refreshes and range details
    Debug,
    /// Everything
    Trace,
}

impl CliLogLevel {
    /// Converts to the matching `tracing::Level`.
    ///
    /// # Examples
    /// ```
    /// use magstream_core::tracing_setup::CliLogLevel;
    ///
    /// assert_eq!(CliLogLevel::Info.as_tracing_level(), tracing::Level::INFO);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::str::FromStr for CliLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s.trim(), true).map_err(|_| format!("Invalid log level: {s}"))
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_tracing_level().as_str().to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("WARN".parse::<CliLogLevel>(), Ok(CliLogLevel::Warn));
        assert_eq!(" debug ".parse::<CliLogLevel>(), Ok(CliLogLevel::Debug));
        assert!("verbose".parse::<CliLogLevel>().is_err());
        assert_eq!(CliLogLevel::Trace.to_string(), "trace");
        assert_eq!(CliLogLevel::Trace.as_tracing_level(), Level::TRACE);
    }

    #[test]
    fn test_console_directives_scope_level_to_magstream() {
        let directives = console_directives(Level::DEBUG);
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("magstream_core=debug"));
        assert!(directives.contains("magstream_web=debug"));
        assert!(directives.contains("hyper=warn"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn test_trace_file_directives_parse() {
        let directives = trace_file_directives();
        assert!(directives.contains("magstream_core=trace"));
        assert!(EnvFilter::try_new(directives).is_ok());
    }
}
