//! Persisted API key record.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Number of random bytes in a generated secret (256 bits).
pub const SECRET_BYTES: usize = 32;

/// The current/previous secret pair.
///
/// `previous` always holds the value `current` had before the latest rotation,
/// or `None` if the record has never rotated.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub current: String,
    pub previous: Option<String>,
    #[serde(with = "crate::timestamp::lenient")]
    pub last_rotated: DateTime<Utc>,
}

impl KeyRecord {
    /// A fresh record with a newly generated secret.
    pub fn generate(now: DateTime<Utc>) -> Self {
        Self {
            current: generate_secret(),
            previous: None,
            last_rotated: now,
        }
    }

    /// Replace `current` with a new secret, keeping the old one as `previous`.
    pub fn rotated(&self, now: DateTime<Utc>) -> Self {
        Self {
            current: generate_secret(),
            previous: Some(self.current.clone()),
            last_rotated: now,
        }
    }
}

// Secrets stay out of logs and debug output.
impl std::fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRecord")
            .field("current", &"<redacted>")
            .field("previous", &self.previous.as_ref().map(|_| "<redacted>"))
            .field("last_rotated", &self.last_rotated)
            .finish()
    }
}

/// Generate a hex-encoded secret from the OS random source.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
