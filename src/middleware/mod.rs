//! Middleware for observability.
//!
//! This module provides request logging with latency tracking for the
//! read API. The token-bucket rate limiter used by the ingestion pipeline
//! lives in `ingestion::ratelimit` — it throttles outbound upstream calls,
//! not inbound requests to this service.

pub mod logging;

pub use logging::{request_logging, request_logging_simple};
