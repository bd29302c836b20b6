//! Type-safe user identifier.
//!
//! [`UserId`] is a newtype wrapper around the opaque string the backend uses
//! to identify a user session. It keys the connection registry, the shared
//! store, and notification targets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RealtimeError;

/// Longest identifier accepted from clients.
const MAX_LEN: usize = 128;

/// Identifier of a notification recipient.
///
/// Always non-empty, trimmed, and free of whitespace and `:` (which would
/// collide with store key separators).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Validates and wraps a raw identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidRequest`] if the identifier is empty,
    /// longer than 128 bytes, or contains whitespace or `:`.
    pub fn parse(raw: &str) -> Result<Self, RealtimeError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RealtimeError::InvalidRequest(
                "user id must not be empty".to_string(),
            ));
        }
        if trimmed.len() > MAX_LEN {
            return Err(RealtimeError::InvalidRequest(format!(
                "user id longer than {MAX_LEN} bytes"
            )));
        }
        if trimmed.chars().any(|c| c.is_whitespace() || c == ':') {
            return Err(RealtimeError::InvalidRequest(format!(
                "user id contains invalid characters: {trimmed}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = RealtimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}
