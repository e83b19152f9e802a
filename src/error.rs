use thiserror::Error;

/// The five error classes the engine distinguishes, per the propagation policy:
/// fatal errors abort the process at startup; everything else is confined to
/// the iteration that produced it.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Fatal at startup: missing API key id when order-book auth is required,
    /// an unparseable private key, or an unreadable TOML config file.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Retry by the next tick/cycle; never aborts the owning loop. Covers
    /// non-2xx responses, transport failures, JSON decode failures, and
    /// empty/malformed book sides.
    #[error("transient upstream error: {0}")]
    TransientUpstreamError(String),

    /// Logged and skipped. The update is still accepted into the store to
    /// avoid staleness; the anomaly is surfaced on the debug endpoint instead.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Silently dropped: signal channel full, snapshot ring full (rotates).
    #[error("overflow: {0}")]
    Overflow(String),

    /// Surfaced to callers as HTTP 404.
    #[error("not found: {0}")]
    NotFound(String),
}

impl EngineError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::ConfigError(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
