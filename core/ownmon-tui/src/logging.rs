//! Tracing setup.
//!
//! The dashboard owns the terminal, so it writes to a daily log file under
//! `~/.ownmon/logs`. Headless commands log to stderr. `RUST_LOG` controls the
//! filter (default `info`); `OWNMON_DEBUG_LOG=1` forces `debug`.

use std::any::Any;
use std::env;
use std::panic;
use std::path::PathBuf;
use tracing::error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const DEBUG_ENV: &str = "OWNMON_DEBUG_LOG";
const LOG_FILE_PREFIX: &str = "ownmon.log";

fn env_filter() -> EnvFilter {
    let debug_enabled = env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

pub fn log_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ownmon").join("logs"))
}

/// Logs to a rolling file. The guard must live until exit or buffered lines
/// are lost. Without a usable log directory logging is off.
pub fn init_file() -> Option<WorkerGuard> {
    let dir = log_dir()?;
    if let Err(err) = fs_err::create_dir_all(&dir) {
        eprintln!("ownmon: logging disabled: {err}");
        return None;
    }

    let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}

pub fn init_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// Sends panic reports to the log instead of stderr, which the dashboard's
/// alternate screen would swallow or garble.
pub fn route_panics_to_log() {
    panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|location| format!("{}:{}", location.file(), location.line()))
            .unwrap_or_default();
        error!(
            location = %location,
            payload = panic_message(info.payload()),
            "Panic"
        );
    }));
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_reads_string_payloads() {
        let literal: Box<dyn Any + Send> = Box::new("observer failed");
        assert_eq!(panic_message(literal.as_ref()), "observer failed");

        let formatted: Box<dyn Any + Send> = Box::new(format!("index {}", 3));
        assert_eq!(panic_message(formatted.as_ref()), "index 3");

        let other: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}
