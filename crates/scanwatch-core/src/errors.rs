use scanwatch_protocol::InvalidInvoiceId;

/// All error kinds of the status synchronization subsystem.
///
/// `Clone` so one fetch outcome can be handed to every caller coalesced
/// onto it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Network unreachable, timeout, or non-2xx response.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Body did not match the expected shape, or described an impossible state.
    #[error("malformed response: {message}")]
    MalformedResponse { message: String },

    /// The caller passed an invalid argument.
    #[error("invalid input: {message}")]
    Validation { message: String },

    /// The fetch was abandoned because its subscription was torn down.
    #[error("fetch cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn transport(message: impl Into<String>) -> Self {
        SyncError::Transport {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        SyncError::MalformedResponse {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        SyncError::Validation {
            message: message.into(),
        }
    }

    /// Error code for programmatic handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::Transport { .. } => "TRANSPORT_ERROR",
            SyncError::MalformedResponse { .. } => "MALFORMED_RESPONSE",
            SyncError::Validation { .. } => "VALIDATION_ERROR",
            SyncError::Cancelled => "CANCELLED",
        }
    }

    /// Whether this error is caused by user input.
    pub fn is_user_error(&self) -> bool {
        matches!(self, SyncError::Validation { .. })
    }

    /// Whether the next poll tick may succeed where this one failed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Transport { .. } | SyncError::MalformedResponse { .. }
        )
    }
}

impl From<InvalidInvoiceId> for SyncError {
    fn from(err: InvalidInvoiceId) -> Self {
        SyncError::validation(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::transport(format!("request timed out: {err}"))
        } else if err.is_decode() {
            SyncError::malformed(err.to_string())
        } else {
            SyncError::transport(err.to_string())
        }
    }
}
