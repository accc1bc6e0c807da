//! Git commit hash newtype for recorded source commits.
//!
//! Validates that the value is a full 40-character lowercase hexadecimal
//! object name. Abbreviated names are rejected because a remote will only
//! serve a shallow fetch of a commit by its full name.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Length of a full SHA-1 object name.
const FULL_LEN: usize = 40;

/// Length of the prefix shown by [`CommitHash::short`].
pub const SHORT_LEN: usize = 7;

/// Errors from validating a commit hash.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid commit hash '{value}': {reason}")]
pub struct CommitHashError {
    /// The rejected value.
    pub value: String,
    /// Why it was rejected.
    pub reason: String,
}

/// A validated full git commit hash.
///
/// # Examples
///
/// ```
/// use provenance_verifier::registry::CommitHash;
///
/// let hash = CommitHash::try_from("0123456789abcdef0123456789abcdef01234567")?;
/// assert_eq!(hash.short(), "0123456");
/// # Ok::<(), provenance_verifier::registry::CommitHashError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CommitHash(String);

impl CommitHash {
    /// Return the hash as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the abbreviated form used in messages.
    #[must_use]
    pub fn short(&self) -> &str {
        // Validation guarantees at least SHORT_LEN ASCII characters.
        self.0.get(..SHORT_LEN).unwrap_or(&self.0)
    }
}

impl TryFrom<&str> for CommitHash {
    type Error = CommitHashError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate(value)?;
        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for CommitHash {
    type Error = CommitHashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate(&value)?;
        Ok(Self(value))
    }
}

impl AsRef<str> for CommitHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate(value: &str) -> Result<(), CommitHashError> {
    let reject = |reason: String| CommitHashError {
        value: value.to_owned(),
        reason,
    };
    if value.len() != FULL_LEN {
        return Err(reject(format!(
            "must be {FULL_LEN} characters, got {}",
            value.len()
        )));
    }
    if let Some(bad) = value.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(reject(format!("non-hex character '{bad}'")));
    }
    if value.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(reject("must be lowercase".to_owned()));
    }
    Ok(())
}
