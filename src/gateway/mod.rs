//! gRPC surface of the gateway.

mod server;
mod service;

pub mod proto;

pub use server::GrpcServer;
pub use service::{GatewayOptions, GatewayService, UNKNOWN_CLIENT};

// Re-export commonly used types
pub use proto::gateway_server::{Gateway, GatewayServer};
pub use proto::{
    ExportRequest, ExportResponse, ProcessRequest, ProcessResponse, PurgeRequest, PurgeResponse,
    RotateKeyRequest, RotateKeyResponse,
};
