//! Error types for ownmon-live operations.
//!
//! Transport failures and decode failures never surface here: the connection
//! manager absorbs them (reconnect loop, drop-and-log). What remains are
//! setup errors and errors of explicit requests made by the caller.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration read failed: {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Invalid configuration value for {key}: {value}")]
    ConfigValue { key: String, value: String },

    #[error("Home directory not found")]
    HomeDirNotFound,

    // ─────────────────────────────────────────────────────────────────────
    // Connection Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Invalid endpoint {url}: {details}")]
    InvalidEndpoint { url: String, details: String },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("Transport could not be started: {0}")]
    Transport(String),

    // ─────────────────────────────────────────────────────────────────────
    // HTTP Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("HTTP request failed: {endpoint}: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {endpoint}")]
    HttpStatus { endpoint: String, status: u16 },
}

/// Convenience type alias for Results using LiveError.
pub type Result<T> = std::result::Result<T, LiveError>;
