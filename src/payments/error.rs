use thiserror::Error;

pub type PixResult<T> = Result<T, PixError>;

/// Classified failure of a Pix gateway call
#[derive(Debug, Clone, Error)]
pub enum PixError {
    /// The gateway refused the bearer credential, even after one refresh
    #[error("Pix gateway rejected credentials during {operation}")]
    Unauthorized { operation: String },

    /// Any other 4xx, with the reason the gateway reported
    #[error("Pix gateway rejected the request (HTTP {status}): {reason}")]
    Rejected { status: u16, reason: String },

    /// Transport failure, timeout, 5xx or a body that could not be parsed
    #[error("Unexpected Pix gateway failure: {message}")]
    Unexpected { message: String },

    /// Local setup problem (certificate, client construction)
    #[error("Pix client configuration error: {message}")]
    Configuration { message: String },
}

impl PixError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        PixError::Unexpected {
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, PixError::Unexpected { .. })
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PixError::Rejected { .. } => 400,
            PixError::Unauthorized { .. } => 500,
            PixError::Unexpected { .. } => 500,
            PixError::Configuration { .. } => 500,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PixError::Rejected { reason, .. } => reason.clone(),
            PixError::Unauthorized { .. } => {
                "Payment gateway authorization failed".to_string()
            }
            PixError::Unexpected { .. } => {
                "Payment gateway is temporarily unavailable".to_string()
            }
            PixError::Configuration { .. } => {
                "Payment gateway is not configured correctly".to_string()
            }
        }
    }
}

impl From<PixError> for crate::error::AppError {
    fn from(err: PixError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError, InfrastructureError};

        let kind = match err {
            PixError::Rejected { status, reason } => {
                AppErrorKind::External(ExternalError::PixRejected { status, reason })
            }
            PixError::Unauthorized { operation } => {
                AppErrorKind::External(ExternalError::PixUnauthorized { operation })
            }
            PixError::Unexpected { message } => {
                AppErrorKind::External(ExternalError::PixUnavailable { message })
            }
            PixError::Configuration { message } => {
                AppErrorKind::Infrastructure(InfrastructureError::Configuration { message })
            }
        };

        AppError::new(kind)
    }
}
