//! Unified error handling for the donations backend
//!
//! Every layer-specific error folds into [`AppError`], which knows its HTTP status,
//! its machine-readable code and the message shown to clients.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "DONATION_NOT_FOUND")]
    DonationNotFound,
    #[serde(rename = "TRANSACTION_NOT_FOUND")]
    TransactionNotFound,
    #[serde(rename = "CORRELATION_FAILED")]
    CorrelationFailed,

    // Authorization errors (401, 403)
    #[serde(rename = "CLIENT_CERTIFICATE_REQUIRED")]
    ClientCertificateRequired,
    #[serde(rename = "FORBIDDEN")]
    Forbidden,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CACHE_ERROR")]
    CacheError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors
    #[serde(rename = "PIX_GATEWAY_REJECTED")]
    PixGatewayRejected,
    #[serde(rename = "PIX_GATEWAY_UNAUTHORIZED")]
    PixGatewayUnauthorized,
    #[serde(rename = "PIX_GATEWAY_ERROR")]
    PixGatewayError,
    #[serde(rename = "PAYOUT_FAILED")]
    PayoutFailed,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Business errors tied to donations and their transactions
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Campaign removed between validation and persistence
    DonationNotFound { donation_id: String },
    TransactionNotFound { transaction_id: String },
    /// A gateway confirmation that matches no known transaction, donation or owner
    Correlation { txid: String, reason: String },
}

/// Caller is not allowed to reach the handler
#[derive(Debug, Clone)]
pub enum AuthorizationError {
    MissingClientCertificate,
    InvalidIdentity,
}

/// Infrastructure-level errors (database, cache, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    /// Database connection or query failure
    Database { message: String, is_retryable: bool },
    /// Redis unavailable
    Cache { message: String },
    /// Missing or invalid configuration
    Configuration { message: String },
}

/// Pix gateway errors
#[derive(Debug, Clone)]
pub enum ExternalError {
    PixRejected { status: u16, reason: String },
    PixUnauthorized { operation: String },
    PixUnavailable { message: String },
    /// Forwarding the confirmed amount to the campaign owner failed
    Payout { message: String, refunded: bool },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    InvalidAmount { amount: String, reason: String },
    InvalidEmail { email: String },
    /// donation_id does not reference an active campaign
    InvalidDonation { donation_id: String },
    MissingField { field: String },
    TooLong { field: String, max: usize },
    MalformedPayload { reason: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Authorization(AuthorizationError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::DonationNotFound { .. } => 404,
                DomainError::TransactionNotFound { .. } => 404,
                DomainError::Correlation { .. } => 400,
            },
            AppErrorKind::Authorization(err) => match err {
                AuthorizationError::MissingClientCertificate => 401,
                AuthorizationError::InvalidIdentity => 403,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::PixRejected { .. } => 400,
                ExternalError::PixUnauthorized { .. } => 500,
                ExternalError::PixUnavailable { .. } => 500,
                ExternalError::Payout { .. } => 502, // Bad Gateway
            },
            AppErrorKind::Validation(_) => 400,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::DonationNotFound { .. } => ErrorCode::DonationNotFound,
                DomainError::TransactionNotFound { .. } => ErrorCode::TransactionNotFound,
                DomainError::Correlation { .. } => ErrorCode::CorrelationFailed,
            },
            AppErrorKind::Authorization(err) => match err {
                AuthorizationError::MissingClientCertificate => {
                    ErrorCode::ClientCertificateRequired
                }
                AuthorizationError::InvalidIdentity => ErrorCode::Forbidden,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Cache { .. } => ErrorCode::CacheError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PixRejected { .. } => ErrorCode::PixGatewayRejected,
                ExternalError::PixUnauthorized { .. } => ErrorCode::PixGatewayUnauthorized,
                ExternalError::PixUnavailable { .. } => ErrorCode::PixGatewayError,
                ExternalError::Payout { .. } => ErrorCode::PayoutFailed,
            },
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::DonationNotFound { donation_id } => {
                    format!("Donation '{}' not found", donation_id)
                }
                DomainError::TransactionNotFound { transaction_id } => {
                    format!("Transaction '{}' not found", transaction_id)
                }
                DomainError::Correlation { txid, reason } => {
                    format!("Confirmation for txid '{}' could not be correlated: {}", txid, reason)
                }
            },
            AppErrorKind::Authorization(err) => match err {
                AuthorizationError::MissingClientCertificate => {
                    "A verified client certificate is required".to_string()
                }
                AuthorizationError::InvalidIdentity => "Access denied".to_string(),
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                // The gateway reason is already user-facing
                ExternalError::PixRejected { reason, .. } => reason.clone(),
                ExternalError::PixUnauthorized { .. } => {
                    "Payment gateway authorization failed".to_string()
                }
                ExternalError::PixUnavailable { .. } => {
                    "Payment gateway is temporarily unavailable. Please try again".to_string()
                }
                ExternalError::Payout { refunded, .. } => {
                    if *refunded {
                        "Transfer to the campaign owner failed; the payment was refunded"
                            .to_string()
                    } else {
                        "Transfer to the campaign owner failed".to_string()
                    }
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
                ValidationError::InvalidEmail { email } => {
                    format!("Invalid email '{}'", email)
                }
                ValidationError::InvalidDonation { donation_id } => {
                    format!("Invalid donation id '{}'", donation_id)
                }
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::TooLong { field, max } => {
                    format!("Field '{}' must be at most {} characters", field, max)
                }
                ValidationError::MalformedPayload { reason } => {
                    format!("Malformed payload: {}", reason)
                }
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Authorization(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Cache { .. } => true,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => matches!(err, ExternalError::PixUnavailable { .. }),
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::new(AppErrorKind::Validation(err))
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        AppError::new(AppErrorKind::Domain(err))
    }
}

// Conversions from layer errors live next to those errors (database, payments, services)

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
