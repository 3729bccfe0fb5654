//! Logging setup for `ergo` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `ERGO_LOG` environment variable: a level ("info", "debug") or
//!    `EnvFilter` directives ("ergo_core=debug,warn")
//! 3. `log_level` in `.ergo/config.toml`
//! 4. default to `warn`
//!
//! Logs are sent to STDERR so that stdout carries only command output.

use crate::cli::LogLevel;
use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_ENV: &str = "ERGO_LOG";

/// Install the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>, config_level: Option<&str>) {
    let env_level = std::env::var(LOG_ENV).ok();
    let filter = match (cli_level, env_level.as_deref().and_then(directive_filter)) {
        (None, Some(filter)) => filter,
        _ => level_filter(resolve_level(cli_level, env_level.as_deref(), config_level)),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_level(
    cli_level: Option<LogLevel>,
    env_level: Option<&str>,
    config_level: Option<&str>,
) -> tracing::Level {
    match cli_level {
        Some(lvl) => level_from_log_level(lvl),
        None => env_level
            .and_then(parse_level_str)
            .or_else(|| config_level.and_then(parse_level_str))
            .unwrap_or(tracing::Level::WARN),
    }
}

/// Per-target directives from `ERGO_LOG`. Plain level names are handled by
/// `resolve_level` so they keep their place in the priority order.
fn directive_filter(raw: &str) -> Option<EnvFilter> {
    if !raw.contains('=') {
        return None;
    }
    EnvFilter::try_new(raw.trim()).ok()
}

fn level_filter(level: tracing::Level) -> EnvFilter {
    EnvFilter::default().add_directive(level.into())
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_beats_env_and_config() {
        let level = resolve_level(Some(LogLevel::Debug), Some("error"), Some("trace"));
        assert_eq!(level, tracing::Level::DEBUG);
    }

    #[test]
    fn env_beats_config_and_bad_values_fall_through() {
        assert_eq!(
            resolve_level(None, Some("info"), Some("trace")),
            tracing::Level::INFO
        );
        assert_eq!(
            resolve_level(None, Some("loud"), Some("trace")),
            tracing::Level::TRACE
        );
        assert_eq!(resolve_level(None, None, None), tracing::Level::WARN);
    }

    #[test]
    fn env_directives_are_recognized_and_plain_levels_are_not() {
        assert!(directive_filter("ergo_core=debug").is_some());
        assert!(directive_filter("ergo_core=trace,warn").is_some());
        assert!(directive_filter("debug").is_none());
    }
}
