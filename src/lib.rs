//! Bulwark - Security Gateway for AI Endpoints
//!
//! This crate implements the policy engines that sit in front of an
//! AI-processing endpoint: per-client rate limiting, prompt-injection
//! screening, time-based API key rotation and bounded retention of stored
//! user records. A thin gRPC layer composes them into a service.

pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod keys;
pub mod ratelimit;
pub mod retention;
pub mod sanitize;
pub mod timestamp;
