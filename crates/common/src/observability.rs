//! Tracing subscriber bootstrap for applications embedding mesh components.
//!
//! Libraries in this workspace only emit `tracing` events; installing a
//! subscriber is left to the embedding application, which calls
//! [`init_tracing`] once at startup.

use crate::config::ObservabilityConfig;
use crate::error::CommonError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.log_level` when set.
///
/// # Errors
///
/// Returns `CommonError::Observability` if the filter directive is invalid or
/// a global subscriber is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), CommonError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| CommonError::Observability(format!("invalid log filter: {e}")))?;

    let (plain, json) = if config.json_logs {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .try_init()
        .map_err(|e| CommonError::Observability(e.to_string()))
}
