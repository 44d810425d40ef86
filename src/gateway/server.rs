//! gRPC server implementation.

use std::net::SocketAddr;
use tonic::transport::Server;
use tracing::{error, info};

use super::proto::gateway_server::GatewayServer;
use super::service::GatewayService;
use crate::error::{BulwarkError, Result};

/// gRPC server for the gateway service.
pub struct GrpcServer {
    /// Address to bind to
    addr: SocketAddr,
    service: GatewayService,
}

impl GrpcServer {
    pub fn new(addr: SocketAddr, service: GatewayService) -> Self {
        Self { addr, service }
    }

    /// Start the gRPC server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the gRPC server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        info!(addr = %self.addr, "Starting gRPC server for Gateway");

        Server::builder()
            .add_service(GatewayServer::new(self.service))
            .serve_with_shutdown(self.addr, signal)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                BulwarkError::Grpc(e)
            })
    }
}
