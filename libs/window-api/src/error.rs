/// Category of a stream-service error. Lets the walker decide between
/// failing fast, retrying with backoff, or reporting a client mistake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// Stream (or shard) does not exist. Client-correctable, never retried.
    UnknownStream,
    /// Read throughput exceeded; retry after backoff.
    Throttled,
    /// Network or service-side failure; may retry.
    Transient,
    /// Cursor expired or was never issued by this service.
    InvalidCursor,
    /// Anything else. Permanent.
    Fatal,
}

impl std::fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceErrorKind::UnknownStream => f.write_str("unknown_stream"),
            ServiceErrorKind::Throttled => f.write_str("throttled"),
            ServiceErrorKind::Transient => f.write_str("transient"),
            ServiceErrorKind::InvalidCursor => f.write_str("invalid_cursor"),
            ServiceErrorKind::Fatal => f.write_str("fatal"),
        }
    }
}

/// Unified error type for all `StreamService` methods.
///
/// Carries a `ServiceErrorKind` for categorization and a human-readable
/// message. Malformed JSON from the service maps to `Fatal`.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceError {
    kind: ServiceErrorKind,
    message: String,
}

impl ServiceError {
    pub fn unknown_stream(stream: &str) -> Self {
        Self {
            kind: ServiceErrorKind::UnknownStream,
            message: format!("stream '{stream}' not found"),
        }
    }

    pub fn throttled(msg: impl Into<String>) -> Self {
        Self { kind: ServiceErrorKind::Throttled, message: msg.into() }
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self { kind: ServiceErrorKind::Transient, message: msg.into() }
    }

    pub fn invalid_cursor(msg: impl Into<String>) -> Self {
        Self { kind: ServiceErrorKind::InvalidCursor, message: msg.into() }
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self { kind: ServiceErrorKind::Fatal, message: msg.into() }
    }

    pub fn kind(&self) -> ServiceErrorKind {
        self.kind
    }

    /// Throttling and transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ServiceErrorKind::Throttled | ServiceErrorKind::Transient)
    }
}

impl std::fmt::Debug for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ServiceError {}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self { Self { kind: ServiceErrorKind::Fatal, message: e.to_string() } }
}
