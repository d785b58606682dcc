use crate::error::{AppError, AppErrorKind, InfrastructureError};
use std::fmt;

/// Database error kinds surfaced by the repositories
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    /// Requested row does not exist
    NotFound { entity: String, id: String },
    /// Unique constraint violated (e.g. duplicated txid)
    UniqueViolation { constraint: String },
    /// Foreign key constraint violated (e.g. donation removed)
    ForeignKeyViolation { constraint: String },
    /// Pool exhausted or connection dropped
    ConnectionError { message: String },
    /// Serialization failure or deadlock, safe to retry
    TransactionConflict { message: String },
    Unknown { message: String },
}

#[derive(Debug, Clone)]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    /// Classify a sqlx error using the Postgres SQLSTATE when one is available
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::RowNotFound => DatabaseErrorKind::NotFound {
                entity: "row".to_string(),
                id: String::new(),
            },
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => DatabaseErrorKind::ConnectionError {
                message: err.to_string(),
            },
            sqlx::Error::Database(db_err) => {
                let constraint = db_err.constraint().unwrap_or_default().to_string();
                match db_err.code().as_deref() {
                    Some("23505") => DatabaseErrorKind::UniqueViolation { constraint },
                    Some("23503") => DatabaseErrorKind::ForeignKeyViolation { constraint },
                    Some("40001") | Some("40P01") => DatabaseErrorKind::TransactionConflict {
                        message: db_err.message().to_string(),
                    },
                    _ => DatabaseErrorKind::Unknown {
                        message: db_err.message().to_string(),
                    },
                }
            }
            _ => DatabaseErrorKind::Unknown {
                message: err.to_string(),
            },
        };

        Self { kind }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            DatabaseErrorKind::ConnectionError { .. } | DatabaseErrorKind::TransactionConflict { .. }
        )
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DatabaseErrorKind::NotFound { entity, id } => {
                write!(f, "{} not found: {}", entity, id)
            }
            DatabaseErrorKind::UniqueViolation { constraint } => {
                write!(f, "unique constraint violated: {}", constraint)
            }
            DatabaseErrorKind::ForeignKeyViolation { constraint } => {
                write!(f, "foreign key constraint violated: {}", constraint)
            }
            DatabaseErrorKind::ConnectionError { message } => {
                write!(f, "database connection error: {}", message)
            }
            DatabaseErrorKind::TransactionConflict { message } => {
                write!(f, "transaction conflict: {}", message)
            }
            DatabaseErrorKind::Unknown { message } => write!(f, "database error: {}", message),
        }
    }
}

impl std::error::Error for DatabaseError {}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        let is_retryable = err.is_retryable();
        AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Database {
            message: err.to_string(),
            is_retryable,
        }))
    }
}
