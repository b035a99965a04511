//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag
//! 2. `--verbose` (debug)
//! 3. `TASKS_LOG` environment variable (e.g. "info", "debug")
//! 4. default to `warn`
//!
//! Logs are sent to STDERR so that stdout stays machine-readable.

use anyhow::Result;
use clap::ValueEnum;
use tracing::Level;
use tracing_subscriber::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// Picks the effective level from the flag, `--verbose` and the environment
pub fn resolve_level(cli_level: Option<LogLevel>, verbose: bool, env: Option<&str>) -> Level {
    match cli_level {
        Some(level) => level.into(),
        None if verbose => Level::DEBUG,
        None => env.and_then(parse_level_str).unwrap_or(Level::WARN),
    }
}

/// Initialise the global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>, verbose: bool) -> Result<()> {
    let env = std::env::var("TASKS_LOG").ok();
    let level = resolve_level(cli_level, verbose, env.as_deref());

    fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialise logging: {}", e))?;

    Ok(())
}

fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_beats_verbose_and_env() {
        assert_eq!(resolve_level(Some(LogLevel::Error), true, Some("trace")), Level::ERROR);
    }

    #[test]
    fn verbose_beats_env() {
        assert_eq!(resolve_level(None, true, Some("error")), Level::DEBUG);
    }

    #[test]
    fn env_then_default() {
        assert_eq!(resolve_level(None, false, Some(" Info ")), Level::INFO);
        assert_eq!(resolve_level(None, false, Some("bogus")), Level::WARN);
        assert_eq!(resolve_level(None, false, None), Level::WARN);
    }
}
