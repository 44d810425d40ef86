//! Gateway service implementation.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::proto::{
    gateway_server::Gateway, to_timestamp, ExportRequest, ExportResponse, ProcessRequest,
    ProcessResponse, PurgeRequest, PurgeResponse, RotateKeyRequest, RotateKeyResponse,
};
use crate::clock::Clock;
use crate::error::BulwarkError;
use crate::keys::KeyRotationManager;
use crate::ratelimit::{Decision, RateLimiter};
use crate::retention::RetentionManager;
use crate::sanitize::PatternSanitizer;

/// Client identity used when the caller's address cannot be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Knobs for the composition layer.
#[derive(Debug, Clone, Copy)]
pub struct GatewayOptions {
    /// Take the client identity from `x-forwarded-for`
    pub trust_forwarded_for: bool,
    /// Soft cap on tracked clients before expired rate windows are swept
    pub max_tracked_clients: usize,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            trust_forwarded_for: false,
            max_tracked_clients: 10000,
        }
    }
}

/// Routes prompts through rate limiting and sanitization, and exposes the
/// administrative operations.
pub struct GatewayService {
    limiter: Arc<RateLimiter>,
    sanitizer: PatternSanitizer,
    keys: Arc<KeyRotationManager>,
    retention: Arc<RetentionManager>,
    clock: Arc<dyn Clock>,
    options: GatewayOptions,
}

impl GatewayService {
    pub fn new(
        limiter: Arc<RateLimiter>,
        keys: Arc<KeyRotationManager>,
        retention: Arc<RetentionManager>,
        clock: Arc<dyn Clock>,
        options: GatewayOptions,
    ) -> Self {
        Self {
            limiter,
            sanitizer: PatternSanitizer::new(),
            keys,
            retention,
            clock,
            options,
        }
    }

    /// Identity the rate limiter tracks for this request.
    fn client_key<T>(&self, request: &Request<T>) -> String {
        if self.options.trust_forwarded_for {
            let forwarded = request
                .metadata()
                .get(FORWARDED_FOR)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty());
            if let Some(client) = forwarded {
                return client.to_string();
            }
        }

        request
            .remote_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
    }

    fn admit(&self, client: &str, now: DateTime<Utc>) -> Result<(), Status> {
        self.limiter.evict_if_over(self.options.max_tracked_clients, now);

        match self.limiter.admit(client, now) {
            Decision::Allow { remaining } => {
                debug!(client = %client, remaining, "Request admitted");
                Ok(())
            }
            Decision::Deny { retry_after } => {
                // Round up so a client never retries before the window ends.
                let retry_after_secs = (retry_after.num_milliseconds().max(0) as u64).div_ceil(1000);
                warn!(client = %client, retry_after_secs, "Request rate limited");

                let mut status: Status = BulwarkError::QuotaExceeded { retry_after_secs }.into();
                if let Ok(value) = retry_after_secs.to_string().parse() {
                    status.metadata_mut().insert("retry-after", value);
                }
                Err(status)
            }
        }
    }
}

#[tonic::async_trait]
impl Gateway for GatewayService {
    /// Admit, screen and forward one prompt.
    #[instrument(skip(self, request), fields(prompt_len = request.get_ref().prompt.len()))]
    async fn process(
        &self,
        request: Request<ProcessRequest>,
    ) -> Result<Response<ProcessResponse>, Status> {
        let now = self.clock.now();
        let client = self.client_key(&request);
        self.admit(&client, now)?;

        let req = request.into_inner();
        let prompt = self.sanitizer.sanitize(&req.prompt)?;

        let request_id = Uuid::new_v4().to_string();
        info!(client = %client, request_id = %request_id, "Prompt accepted");

        Ok(Response::new(ProcessResponse {
            message: "AI request sanitized and processed.".to_string(),
            prompt: prompt.to_string(),
            timestamp: Some(to_timestamp(now)),
            request_id,
        }))
    }

    #[instrument(skip(self, _request))]
    async fn rotate_key(
        &self,
        _request: Request<RotateKeyRequest>,
    ) -> Result<Response<RotateKeyResponse>, Status> {
        let outcome = self.keys.rotate_if_due(self.clock.now()).await?;

        info!(rotated = outcome.rotated, "Key rotation check requested");
        Ok(Response::new(RotateKeyResponse {
            rotated: outcome.rotated,
            last_rotated: Some(to_timestamp(outcome.last_rotated)),
        }))
    }

    #[instrument(skip(self, request), fields(max_age_secs = request.get_ref().max_age_secs))]
    async fn purge_expired(
        &self,
        request: Request<PurgeRequest>,
    ) -> Result<Response<PurgeResponse>, Status> {
        let max_age = match request.into_inner().max_age_secs {
            0 => self.retention.max_age(),
            secs => i64::try_from(secs)
                .ok()
                .and_then(Duration::try_seconds)
                .ok_or_else(|| Status::invalid_argument("max_age_secs out of range"))?,
        };

        let report = self.retention.purge_expired(self.clock.now(), max_age).await?;

        Ok(Response::new(PurgeResponse {
            deleted: report.deleted as u64,
            failed: report.failed as u64,
            scanned: report.scanned as u64,
        }))
    }

    #[instrument(skip(self, request), fields(user_id = %request.get_ref().user_id))]
    async fn export(
        &self,
        request: Request<ExportRequest>,
    ) -> Result<Response<ExportResponse>, Status> {
        let user_id = request.into_inner().user_id;
        let record = self.retention.export(&user_id).await?;
        let payload_json = serde_json::to_string(&record.payload).map_err(BulwarkError::from)?;

        info!(user_id = %user_id, "User data exported");
        Ok(Response::new(ExportResponse {
            user_id: record.user_id,
            timestamp: Some(to_timestamp(record.timestamp)),
            payload_json,
        }))
    }
}
