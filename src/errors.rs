use serde::Serialize;

/// Unified error type for every public operation in the crate.
///
/// Business-rule rejections carry a distinct user-facing message per rule;
/// infrastructure failures wrap the underlying cause. No operation panics or
/// leaks an uncaught error across its boundary.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Coupon rejected: {0}")]
    CouponRejected(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Device location unavailable: {0}")]
    LocationUnavailable(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the message suitable for showing to the shopper.
    /// Internal failures return a generic message to avoid leaking details;
    /// the full error is still available for logging.
    pub fn user_message(&self) -> String {
        match self {
            Self::SerializationError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Something went wrong, please try again".to_string()
            }
            Self::ExternalServiceError(_) => {
                "A service we depend on is unreachable, please try again".to_string()
            }
            other => other.to_string(),
        }
    }

    /// True for failures worth retrying later (transient transport errors),
    /// false for rejections the shopper must act on.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ExternalServiceError(_) | Self::LocationUnavailable(_)
        )
    }
}
