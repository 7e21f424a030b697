//! Mesh session configuration.
//!
//! Configuration is loaded from environment variables. The TURN credential is
//! held as a `SecretString` and redacted in Debug output.

use crate::negotiation::IceServer;
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default ICE server list (public STUN only).
pub const DEFAULT_ICE_SERVERS: &str = "stun:stun.l.google.com:19302";

/// Default session watchdog tick in milliseconds.
pub const DEFAULT_WATCHDOG_INTERVAL_MS: u64 = 5_000;

/// Default age of an unanswered offer before it is re-issued.
pub const DEFAULT_OFFER_TIMEOUT_MS: u64 = 10_000;

/// Default upper bound of the random delay added to the offer timeout.
pub const DEFAULT_OFFER_RETRY_JITTER_MS: u64 = 1_000;

/// Default wait for a peer session task to finish when it is closed.
pub const DEFAULT_SESSION_CLOSE_TIMEOUT_MS: u64 = 2_000;

/// Mesh session configuration.
#[derive(Clone)]
pub struct Config {
    /// STUN/TURN servers handed to the connection factory.
    pub ice_servers: Vec<IceServer>,

    /// How often each peer session checks for stale offers and failed
    /// connections (default: 5s).
    pub watchdog_interval: Duration,

    /// Age of an unanswered offer before the watchdog rolls it back
    /// (default: 10s).
    pub offer_timeout: Duration,

    /// Upper bound of the random wait between rolling back an unanswered
    /// offer and re-issuing it.
    pub offer_retry_jitter: Duration,

    /// How long the manager waits for a closed session's task.
    pub session_close_timeout: Duration,

    /// Request the microphone when joining.
    pub initial_audio: bool,

    /// Request the camera when joining.
    pub initial_video: bool,

    /// Stop all capture when both microphone and camera are off.
    pub release_idle_devices: bool,
}

/// Custom Debug implementation that redacts TURN credentials.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ice_urls: Vec<&str> = self
            .ice_servers
            .iter()
            .flat_map(|server| server.urls.iter().map(String::as_str))
            .collect();
        let has_turn_credential = self.ice_servers.iter().any(|s| s.credential.is_some());

        f.debug_struct("Config")
            .field("ice_servers", &ice_urls)
            .field(
                "turn_credential",
                &if has_turn_credential {
                    "[REDACTED]"
                } else {
                    "[NONE]"
                },
            )
            .field("watchdog_interval", &self.watchdog_interval)
            .field("offer_timeout", &self.offer_timeout)
            .field("offer_retry_jitter", &self.offer_retry_jitter)
            .field("session_close_timeout", &self.session_close_timeout)
            .field("initial_audio", &self.initial_audio)
            .field("initial_video", &self.initial_video)
            .field("release_idle_devices", &self.release_idle_devices)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ice_servers: parse_ice_servers(DEFAULT_ICE_SERVERS, None, None),
            watchdog_interval: Duration::from_millis(DEFAULT_WATCHDOG_INTERVAL_MS),
            offer_timeout: Duration::from_millis(DEFAULT_OFFER_TIMEOUT_MS),
            offer_retry_jitter: Duration::from_millis(DEFAULT_OFFER_RETRY_JITTER_MS),
            session_close_timeout: Duration::from_millis(DEFAULT_SESSION_CLOSE_TIMEOUT_MS),
            initial_audio: false,
            initial_video: false,
            release_idle_devices: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let turn_username = vars.get("MESH_TURN_USERNAME").cloned();
        let turn_credential = vars
            .get("MESH_TURN_CREDENTIAL")
            .map(|c| SecretString::from(c.clone()));

        if turn_credential.is_some() && turn_username.is_none() {
            return Err(ConfigError::MissingEnvVar("MESH_TURN_USERNAME".to_string()));
        }

        let ice_servers = parse_ice_servers(
            vars.get("MESH_ICE_SERVERS")
                .map_or(DEFAULT_ICE_SERVERS, String::as_str),
            turn_username.as_deref(),
            turn_credential.as_ref(),
        );
        if ice_servers.is_empty() {
            return Err(ConfigError::InvalidValue(
                "MESH_ICE_SERVERS must list at least one server".to_string(),
            ));
        }

        let watchdog_interval =
            parse_millis(vars, "MESH_WATCHDOG_INTERVAL_MS", DEFAULT_WATCHDOG_INTERVAL_MS)?;
        // tokio intervals reject a zero period
        if watchdog_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "MESH_WATCHDOG_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }

        let offer_timeout = parse_millis(vars, "MESH_OFFER_TIMEOUT_MS", DEFAULT_OFFER_TIMEOUT_MS)?;
        let offer_retry_jitter = parse_millis(
            vars,
            "MESH_OFFER_RETRY_JITTER_MS",
            DEFAULT_OFFER_RETRY_JITTER_MS,
        )?;
        let session_close_timeout = parse_millis(
            vars,
            "MESH_SESSION_CLOSE_TIMEOUT_MS",
            DEFAULT_SESSION_CLOSE_TIMEOUT_MS,
        )?;

        Ok(Config {
            ice_servers,
            watchdog_interval,
            offer_timeout,
            offer_retry_jitter,
            session_close_timeout,
            initial_audio: parse_bool(vars, "MESH_INITIAL_AUDIO", false)?,
            initial_video: parse_bool(vars, "MESH_INITIAL_VIDEO", false)?,
            release_idle_devices: parse_bool(vars, "MESH_RELEASE_IDLE_DEVICES", false)?,
        })
    }
}

/// Split a comma-separated URL list into ICE server entries.
///
/// TURN credentials attach only to `turn:`/`turns:` URLs.
fn parse_ice_servers(
    raw: &str,
    username: Option<&str>,
    credential: Option<&SecretString>,
) -> Vec<IceServer> {
    raw.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(|url| {
            let is_turn = url.starts_with("turn:") || url.starts_with("turns:");
            IceServer {
                urls: vec![url.to_string()],
                username: username.filter(|_| is_turn).map(str::to_string),
                credential: credential.filter(|_| is_turn).cloned(),
            }
        })
        .collect()
}

fn parse_millis(
    vars: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<Duration, ConfigError> {
    match vars.get(key) {
        None => Ok(Duration::from_millis(default)),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::InvalidValue(format!("{key}={raw:?}: {e}"))),
    }
}

fn parse_bool(
    vars: &HashMap<String, String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match vars.get(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(ConfigError::InvalidValue(format!(
            "{key} must be a boolean, got {v:?}"
        ))),
    }
}
