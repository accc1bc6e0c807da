//! SHA-256 content fingerprints.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Read;

/// A lowercase hex SHA-256 digest of file contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Hash everything `reader` yields.
    ///
    /// # Errors
    ///
    /// Returns the first read error.
    pub fn from_reader<R: Read + ?Sized>(reader: &mut R) -> std::io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];
        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }
        Ok(Self(format!("{:x}", hasher.finalize())))
    }

    /// Hash `bytes`.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(bytes)))
    }

    /// Return the digest as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
