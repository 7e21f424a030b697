//! Common configuration types for mesh session components.

use crate::error::CommonError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default log filter when neither `RUST_LOG` nor `MESH_LOG_LEVEL` is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub log_level: String,
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            json_logs: false,
        }
    }
}

impl ObservabilityConfig {
    /// Load observability settings from a `HashMap` of environment variables.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, CommonError> {
        let log_level = vars
            .get("MESH_LOG_LEVEL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let json_logs = match vars.get("MESH_JSON_LOGS").map(String::as_str) {
            None => false,
            Some("1" | "true" | "TRUE" | "yes") => true,
            Some("0" | "false" | "FALSE" | "no") => false,
            Some(other) => {
                return Err(CommonError::Configuration(format!(
                    "MESH_JSON_LOGS must be a boolean, got {other:?}"
                )))
            }
        };

        Ok(Self {
            log_level,
            json_logs,
        })
    }
}
