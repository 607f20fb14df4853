//! Secret types for keeping room passwords out of logs.
//!
//! Re-exports the [`secrecy`] types. `SecretString` implements `Debug` with
//! redaction, so any struct deriving `Debug` that holds a password is safe to
//! hand to `tracing` with `?field`.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct JoinAttempt {
//!     username: String,
//!     password: Option<SecretString>,
//! }
//!
//! let attempt = JoinAttempt {
//!     username: "alice".to_string(),
//!     password: Some(SecretString::from("hunter2")),
//! };
//!
//! assert!(!format!("{attempt:?}").contains("hunter2"));
//! assert_eq!(attempt.password.as_ref().map(ExposeSecret::expose_secret), Some("hunter2"));
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

/// Compare a stored secret against a supplied candidate.
///
/// Runs over the full length of both inputs regardless of where the first
/// difference is.
#[must_use]
pub fn secret_matches(stored: &SecretString, candidate: &str) -> bool {
    let stored = stored.expose_secret().as_bytes();
    let candidate = candidate.as_bytes();

    let mut diff = stored.len() ^ candidate.len();
    for (i, byte) in stored.iter().enumerate() {
        let other = candidate.get(i).copied().unwrap_or(0);
        diff |= usize::from(byte ^ other);
    }
    diff == 0
}
