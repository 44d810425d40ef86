//! Wire messages for the `bulwark.v1.Gateway` service.

use chrono::{DateTime, Utc};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProcessRequest {
    #[prost(string, tag = "1")]
    pub prompt: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProcessResponse {
    #[prost(string, tag = "1")]
    pub message: String,
    /// The prompt as forwarded downstream
    #[prost(string, tag = "2")]
    pub prompt: String,
    #[prost(message, optional, tag = "3")]
    pub timestamp: Option<prost_types::Timestamp>,
    #[prost(string, tag = "4")]
    pub request_id: String,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct RotateKeyRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RotateKeyResponse {
    #[prost(bool, tag = "1")]
    pub rotated: bool,
    #[prost(message, optional, tag = "2")]
    pub last_rotated: Option<prost_types::Timestamp>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct PurgeRequest {
    /// Maximum record age; zero selects the configured default
    #[prost(uint64, tag = "1")]
    pub max_age_secs: u64,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct PurgeResponse {
    #[prost(uint64, tag = "1")]
    pub deleted: u64,
    #[prost(uint64, tag = "2")]
    pub failed: u64,
    #[prost(uint64, tag = "3")]
    pub scanned: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExportRequest {
    #[prost(string, tag = "1")]
    pub user_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExportResponse {
    #[prost(string, tag = "1")]
    pub user_id: String,
    #[prost(message, optional, tag = "2")]
    pub timestamp: Option<prost_types::Timestamp>,
    /// The stored payload, JSON-encoded
    #[prost(string, tag = "3")]
    pub payload_json: String,
}

pub fn to_timestamp(ts: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: ts.timestamp(),
        nanos: ts.timestamp_subsec_nanos() as i32,
    }
}

// Server stubs generated by build.rs.
tonic::include_proto!("bulwark.v1.Gateway");
