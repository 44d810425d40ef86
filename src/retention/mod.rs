//! User data retention and export.

mod manager;
mod record;
mod store;

pub use manager::{PurgeReport, RetentionManager, DEFAULT_MAX_AGE_DAYS};
pub use record::{is_valid_user_id, UserRecord};
pub use store::{FileRecordStore, MemoryRecordStore, RecordStore};
