use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found")]
    NotFound,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    #[error("Unsupported payment method: {0}")]
    UnsupportedMethod(String),

    #[error("Payment provider rate limited")]
    ProviderRateLimited,

    #[error("Payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Payment provider rejected request: {0}")]
    ProviderRejected(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether a retry of the same operation may succeed. Retryable errors
    /// must never mark a payment failed; the payment stays pending for the
    /// next sweep or webhook redelivery.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Database(_)
            | AppError::ProviderRateLimited
            | AppError::ProviderUnavailable(_)
            | AppError::Internal(_) => true,

            AppError::NotFound
            | AppError::InvalidInput(_)
            | AppError::InvalidSignature
            | AppError::UnknownPlan(_)
            | AppError::UnsupportedMethod(_)
            | AppError::ProviderRejected(_) => false,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound,
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                if msg.contains("duplicate key") || msg.contains("unique constraint") {
                    AppError::InvalidInput("A record with this value already exists".into())
                } else if msg.contains("foreign key") || msg.contains("violates foreign key") {
                    AppError::InvalidInput("Referenced record not found".into())
                } else {
                    tracing::error!(error = ?err, "Database error");
                    AppError::Database("Database operation failed".into())
                }
            }
            _ => {
                tracing::error!(error = ?err, "Database error");
                AppError::Database("Database operation failed".into())
            }
        }
    }
}

/// Whether a sqlx error is a Postgres unique-constraint violation. Used by
/// the completion transaction to treat duplicate external references as
/// already-processed rather than as failures.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}

#[derive(Clone, Copy, Debug)]
pub enum ErrorCode {
    DatabaseError,
    NotFound,
    InvalidInput,
    InvalidSignature,
    UnknownPlan,
    UnsupportedMethod,
    ProviderRateLimited,
    ProviderUnavailable,
    ProviderRejected,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::UnknownPlan => "UNKNOWN_PLAN",
            ErrorCode::UnsupportedMethod => "UNSUPPORTED_METHOD",
            ErrorCode::ProviderRateLimited => "PROVIDER_RATE_LIMITED",
            ErrorCode::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            ErrorCode::ProviderRejected => "PROVIDER_REJECTED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
