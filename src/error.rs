use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("access denied: {0}")]
    Authorization(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("referenced {0} does not exist")]
    Referential(&'static str),
    #[error("storage unavailable: {0}")]
    TransientStorage(String),
    #[error("internal storage error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    /// Only storage outages are worth retrying; everything else is deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStorage(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row"),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
                StoreError::TransientStorage(err.to_string())
            }
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) => StoreError::TransientStorage(err.to_string()),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                // unique_violation, check_violation, not_null_violation
                Some("23505") | Some("23514") | Some("23502") => {
                    StoreError::Validation(db_err.message().to_string())
                }
                Some("23503") => StoreError::Referential("row"),
                // insufficient_privilege: raised when a row violates a policy
                Some("42501") => StoreError::Authorization(db_err.message().to_string()),
                // serialization_failure, deadlock_detected, admin shutdown
                Some("40001") | Some("40P01") | Some("57P01") => {
                    StoreError::TransientStorage(db_err.message().to_string())
                }
                _ => StoreError::Internal(db_err.message().to_string()),
            },
            _ => StoreError::Internal(err.to_string()),
        }
    }
}
