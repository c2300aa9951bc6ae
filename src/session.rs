//! Session identifiers carried in every query header.

use rand::Rng;
use std::fmt;
use std::str::FromStr;

use crate::{CourierError, Result, BASE32_ALPHABET, SESSION_ID_LEN};

/// 13-character identifier correlating all queries of one payload transfer.
///
/// Ids are restricted to the base32 alphabet (A-Z, 2-7) so that every header
/// byte has a defined checksum mapping and survives case-folding resolvers.
/// Lowercase input is accepted and folded to uppercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId([u8; SESSION_ID_LEN]);

impl SessionId {
    /// Validate a caller-supplied id.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is not exactly 13 characters or contains
    /// a character outside the base32 alphabet.
    pub fn new(id: &str) -> Result<Self> {
        if let Some(bad) = id.chars().find(|c| !c.is_ascii()) {
            return Err(CourierError::SessionIdChar(bad));
        }
        if id.len() != SESSION_ID_LEN {
            return Err(CourierError::SessionIdLength(id.chars().count()));
        }

        let mut bytes = [0u8; SESSION_ID_LEN];
        for (i, b) in id.bytes().enumerate() {
            let up = b.to_ascii_uppercase();
            match up {
                b'A'..=b'Z' | b'2'..=b'7' => bytes[i] = up,
                _ => return Err(CourierError::SessionIdChar(b as char)),
            }
        }

        Ok(Self(bytes))
    }

    /// Generate a random id for callers without their own id scheme.
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; SESSION_ID_LEN];
        for b in bytes.iter_mut() {
            *b = BASE32_ALPHABET[rng.gen_range(0..BASE32_ALPHABET.len())];
        }
        Self(bytes)
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        // Always ASCII by construction
        std::str::from_utf8(&self.0).unwrap()
    }

    /// The id's raw bytes.
    pub fn as_bytes(&self) -> &[u8; SESSION_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionId {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}
