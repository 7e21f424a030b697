//! Common utilities and types shared across mesh session components.

#![warn(clippy::pedantic)]

/// Module for common error types
pub mod error;

/// Module for common data types
pub mod types;

/// Module for common configuration
pub mod config;

/// Module for tracing subscriber bootstrap
pub mod observability;

/// Module for secret types that prevent accidental logging
pub mod secret;
