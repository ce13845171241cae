//! Connection target configuration.
//!
//! Resolution order, later wins:
//! 1. Built-in defaults (`ws://127.0.0.1:13234/ws`)
//! 2. `~/.ownmon/live.toml` (missing file is not an error)
//! 3. `OWNMON_*` environment variables
//!
//! Binaries layer their CLI flags on top of the returned value.

use crate::error::{LiveError, Result};
use ownmon_protocol::{DEFAULT_HOST, DEFAULT_PORT, STREAM_PATH};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const HOST_ENV: &str = "OWNMON_HOST";
pub const PORT_ENV: &str = "OWNMON_PORT";
pub const SCHEME_ENV: &str = "OWNMON_SCHEME";
pub const VERIFY_TLS_ENV: &str = "OWNMON_VERIFY_TLS";

const CONFIG_DIR: &str = ".ownmon";
const CONFIG_FILE: &str = "live.toml";
const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Ws,
    Wss,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        }
    }

    /// Scheme of the companion HTTP API on the same host.
    pub fn http_scheme(&self) -> &'static str {
        match self {
            Scheme::Ws => "http",
            Scheme::Wss => "https",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ws" => Some(Scheme::Ws),
            "wss" => Some(Scheme::Wss),
            _ => None,
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, Scheme::Wss)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiveConfig {
    pub host: String,
    pub port: u16,
    pub scheme: Scheme,
    /// When false, certificate and hostname checks are skipped for `wss`/`https`.
    pub verify_tls: bool,
    pub reconnect_delay_ms: u64,
    pub http_timeout_ms: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            scheme: Scheme::Ws,
            verify_tls: true,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            http_timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
        }
    }
}

impl LiveConfig {
    pub fn stream_url(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.scheme.as_str(),
            self.host,
            self.port,
            STREAM_PATH
        )
    }

    pub fn http_base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme.http_scheme(), self.host, self.port)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Applies `OWNMON_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(HOST_ENV) {
            self.host = host;
        }
        if let Some(port) = lookup(PORT_ENV) {
            self.port = port.trim().parse().map_err(|_| LiveError::ConfigValue {
                key: PORT_ENV.to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(scheme) = lookup(SCHEME_ENV) {
            self.scheme = Scheme::from_str(&scheme).ok_or_else(|| LiveError::ConfigValue {
                key: SCHEME_ENV.to_string(),
                value: scheme.clone(),
            })?;
        }
        if let Some(verify) = lookup(VERIFY_TLS_ENV) {
            self.verify_tls = parse_flag(&verify).ok_or_else(|| LiveError::ConfigValue {
                key: VERIFY_TLS_ENV.to_string(),
                value: verify.clone(),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(LiveError::ConfigValue {
                key: "host".to_string(),
                value: self.host.clone(),
            });
        }
        if self.port == 0 {
            return Err(LiveError::ConfigValue {
                key: "port".to_string(),
                value: self.port.to_string(),
            });
        }
        // A zero delay would turn the reconnect loop into a busy retry.
        if self.reconnect_delay_ms == 0 {
            return Err(LiveError::ConfigValue {
                key: "reconnect_delay_ms".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// Returns `~/.ownmon/live.toml`.
pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(LiveError::HomeDirNotFound)?;
    Ok(home.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Loads the config file (defaults when absent) and applies env overrides.
pub fn load_config(path: Option<PathBuf>) -> Result<LiveConfig> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    let mut config = load_config_file(&config_path)?;
    config.apply_env(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

pub fn load_config_file(path: &Path) -> Result<LiveConfig> {
    if !path.exists() {
        return Ok(LiveConfig::default());
    }

    let content = fs_err::read_to_string(path).map_err(|source| LiveError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str::<LiveConfig>(&content).map_err(|err| LiveError::ConfigMalformed {
        path: path.to_path_buf(),
        details: err.to_string(),
    })
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}
