//! Stored per-user records.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{BulwarkError, Result};
use crate::timestamp;

/// A user's stored document with its creation time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

impl UserRecord {
    pub fn new(user_id: impl Into<String>, timestamp: DateTime<Utc>, payload: Value) -> Self {
        Self {
            user_id: user_id.into(),
            timestamp,
            payload,
        }
    }

    /// Interpret a stored document.
    ///
    /// Documents are `{"timestamp": ..., "payload": ...}`. Older documents keep
    /// their fields next to `timestamp` at the top level; those fields become the
    /// payload.
    pub fn from_document(user_id: &str, document: Value) -> Result<Self> {
        let Value::Object(mut fields) = document else {
            return Err(BulwarkError::persistence(format!(
                "record {user_id} is not a JSON object"
            )));
        };

        let raw = match fields.remove("timestamp") {
            Some(Value::String(raw)) => raw,
            Some(_) => {
                return Err(BulwarkError::persistence(format!(
                    "record {user_id} has a non-string timestamp"
                )))
            }
            None => {
                return Err(BulwarkError::persistence(format!(
                    "record {user_id} has no timestamp"
                )))
            }
        };
        let timestamp = timestamp::parse(&raw).ok_or_else(|| {
            BulwarkError::persistence(format!("record {user_id} has a malformed timestamp"))
        })?;

        let payload = match fields.remove("payload") {
            Some(payload) if fields.is_empty() => payload,
            Some(payload) => {
                fields.insert("payload".to_string(), payload);
                Value::Object(fields)
            }
            None => Value::Object(fields),
        };

        Ok(Self::new(user_id, timestamp, payload))
    }

    /// The persisted form of this record.
    pub fn to_document(&self) -> Value {
        json!({
            "timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            "payload": self.payload,
        })
    }
}

/// Whether `user_id` can name a stored record.
///
/// Ids double as file names, so anything that could escape the data directory
/// is refused.
pub fn is_valid_user_id(user_id: &str) -> bool {
    !user_id.is_empty()
        && user_id.len() <= 128
        && !user_id.starts_with('.')
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_document() {
        let doc = json!({"timestamp": "2024-05-01T12:00:00Z", "payload": {"name": "Ada"}});
        let record = UserRecord::from_document("123", doc).unwrap();

        assert_eq!(record.user_id, "123");
        assert_eq!(record.payload, json!({"name": "Ada"}));
        assert_eq!(record.timestamp, timestamp::parse("2024-05-01T12:00:00Z").unwrap());
    }

    #[test]
    fn test_from_legacy_flat_document() {
        let doc = json!({"timestamp": "2024-05-01 12:00:00", "email": "ada@example.com", "plan": "pro"});
        let record = UserRecord::from_document("ada", doc).unwrap();

        assert_eq!(record.payload, json!({"email": "ada@example.com", "plan": "pro"}));
    }

    #[test]
    fn test_to_document_round_trips() {
        let ts = timestamp::parse("2024-05-01T12:00:00.250Z").unwrap();
        let record = UserRecord::new("u1", ts, json!([1, 2, 3]));
        let back = UserRecord::from_document("u1", record.to_document()).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_malformed_timestamps_rejected() {
        for doc in [
            json!({"payload": {}}),
            json!({"timestamp": 1714564800, "payload": {}}),
            json!({"timestamp": "last tuesday", "payload": {}}),
            json!("just a string"),
        ] {
            let err = UserRecord::from_document("x", doc).unwrap_err();
            assert!(matches!(err, BulwarkError::Persistence(_)));
        }
    }

    #[test]
    fn test_user_id_validation() {
        assert!(is_valid_user_id("123"));
        assert!(is_valid_user_id("user-42_a.b"));
        assert!(!is_valid_user_id(""));
        assert!(!is_valid_user_id("../api_keys"));
        assert!(!is_valid_user_id("a/b"));
        assert!(!is_valid_user_id(".hidden"));
        assert!(!is_valid_user_id("name with space"));
    }
}
