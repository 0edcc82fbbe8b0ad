use window_api::ServiceError;

/// Which side of the interface has to fix a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// Bad input (empty or unknown stream); do not retry as-is.
    Client,
    /// Stream service unavailable, gave up, or the caller went away.
    Service,
}

#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("stream '{stream}' not found")]
    UnknownStream { stream: String },

    #[error("cursor ({stream}): {source}")]
    Cursor { stream: String, source: ServiceError },

    #[error("get records ({stream}) failed after {attempts} attempt(s): {source}")]
    PageFetch {
        stream: String,
        attempts: usize,
        source: ServiceError,
    },

    #[error("request cancelled")]
    Cancelled,
}

impl WindowError {
    pub fn status_class(&self) -> StatusClass {
        match self {
            WindowError::InvalidRequest(_) | WindowError::UnknownStream { .. } => StatusClass::Client,
            WindowError::Cursor { .. } | WindowError::PageFetch { .. } | WindowError::Cancelled => {
                StatusClass::Service
            }
        }
    }
}
