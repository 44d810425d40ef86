//! API key rotation.

mod manager;
mod record;
mod store;

pub use manager::{KeyRotationManager, RotationOutcome, DEFAULT_ROTATION_INTERVAL_DAYS};
pub use record::{generate_secret, KeyRecord, SECRET_BYTES};
pub use store::{FileKeyStore, KeyStore, MemoryKeyStore, StoreLock};
