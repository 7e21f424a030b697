//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] wrappers. TURN credentials handed to the
//! connection factory travel as `SecretString`, so any `Debug` derive on a
//! struct carrying one (ICE server lists, session configuration) prints a
//! redacted placeholder instead of the credential.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct TurnServer {
//!     url: String,
//!     credential: SecretString,
//! }
//!
//! let server = TurnServer {
//!     url: "turn:turn.example.com:3478".to_string(),
//!     credential: SecretString::from("relay-pass"),
//! };
//!
//! assert!(!format!("{server:?}").contains("relay-pass"));
//! assert_eq!(server.credential.expose_secret(), "relay-pass");
//! ```
//!
//! With the `serde` feature enabled on `secrecy`, secrets deserialize directly
//! from configuration documents.

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};
