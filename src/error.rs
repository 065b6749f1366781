use crate::database::DatabaseError;
use rust_decimal::Decimal;
use sqlx::Error as SqlxError;
use thiserror::Error;

/// Application-level error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database errors
    #[error("SQL error: {0}")]
    Sqlx(#[from] SqlxError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bad capacity, amount, room type, message or contact details
    #[error("Validation error: {0}")]
    Validation(String),

    /// The creator cannot fund the escrow for a new room
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: Decimal, required: Decimal },

    #[error("Gift room not found")]
    RoomNotFound,

    #[error("Reservation not found")]
    ReservationNotFound,

    #[error("Gift room is full")]
    RoomFull,

    #[error("Gift room has expired")]
    RoomExpired,

    /// Claim attempted after the reservation expired or the room was refunded
    #[error("Gift has expired")]
    GiftExpired,

    #[error("Gift room has already been refunded")]
    AlreadyRefunded,

    /// Every slot was claimed, there is nothing left in escrow
    #[error("Nothing to refund: every gift in this room was claimed")]
    NothingToRefund,

    #[error("Refund not available: {0}")]
    RefundNotAvailable(String),

    /// Too many active reservations from one device fingerprint
    #[error("This device already holds a reservation in this room")]
    DeviceLimitReached,

    #[error("Too many requests, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Not found errors
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Unauthorized access errors
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Business logic errors
    #[error("Business logic error: {0}")]
    BusinessLogic(String),

    /// Transient infrastructure failure, safe to retry
    #[error("Network error: {0}")]
    Network(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// UUID parsing errors
    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    /// Generic error with message
    #[error("{0}")]
    Message(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Check if error is a database connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            AppError::Database(DatabaseError::PoolCreation(_))
                | AppError::Database(DatabaseError::ConnectionTimeout)
                | AppError::Sqlx(SqlxError::PoolTimedOut)
                | AppError::Sqlx(SqlxError::PoolClosed)
                | AppError::Sqlx(SqlxError::Io(_))
        )
    }

    /// Check if error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AppError::NotFound(_) | AppError::RoomNotFound | AppError::ReservationNotFound
        )
    }

    /// Whether an idempotent operation may be re-attempted after this error
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Network(_) => true,
            AppError::Sqlx(SqlxError::Database(db_err)) => {
                // serialization_failure, deadlock_detected
                matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
            }
            _ => self.is_connection_error(),
        }
    }

    /// Stable machine-readable code surfaced to clients
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) | AppError::InvalidUuid(_) => "VALIDATION_ERROR",
            AppError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            AppError::RoomNotFound => "ROOM_NOT_FOUND",
            AppError::ReservationNotFound => "RESERVATION_NOT_FOUND",
            AppError::RoomFull => "ROOM_FULL",
            AppError::RoomExpired => "ROOM_EXPIRED",
            AppError::GiftExpired => "GIFT_EXPIRED",
            AppError::AlreadyRefunded => "ALREADY_REFUNDED",
            AppError::NothingToRefund => "NOTHING_TO_REFUND",
            AppError::RefundNotAvailable(_) => "REFUND_NOT_AVAILABLE",
            AppError::DeviceLimitReached => "DEVICE_LIMIT_REACHED",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::BusinessLogic(_) => "CONFLICT",
            AppError::Network(_) => "NETWORK_ERROR",
            _ if self.is_retryable() => "NETWORK_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) | AppError::InvalidUuid(_) => 400,
            AppError::Unauthorized(_) => 401,
            AppError::InsufficientBalance { .. } => 402,
            AppError::NotFound(_) | AppError::RoomNotFound | AppError::ReservationNotFound => 404,
            AppError::RoomFull
            | AppError::AlreadyRefunded
            | AppError::NothingToRefund
            | AppError::RefundNotAvailable(_)
            | AppError::DeviceLimitReached
            | AppError::BusinessLogic(_) => 409,
            AppError::RoomExpired | AppError::GiftExpired => 410,
            AppError::RateLimited { .. } => 429,
            AppError::Network(_) => 503,
            _ if self.is_retryable() => 503,
            _ => 500,
        }
    }
}

/// Repository-specific error types
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Database query error
    #[error("Query error: {0}")]
    Query(SqlxError),

    /// Record not found
    #[error("Record not found")]
    NotFound(String),

    /// Duplicate record
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Amount outside what the money columns can store
    #[error("Amount out of range: {0}")]
    OutOfRange(String),

    /// Balance too low for a debit
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: Decimal, required: Decimal },
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => AppError::NotFound(msg),
            RepositoryError::Query(e) => AppError::Sqlx(e),
            RepositoryError::Duplicate(msg) => AppError::BusinessLogic(format!("Duplicate: {}", msg)),
            RepositoryError::ConstraintViolation(msg) => AppError::BusinessLogic(msg),
            RepositoryError::OutOfRange(msg) => AppError::Validation(msg),
            RepositoryError::InsufficientBalance { available, required } => {
                AppError::InsufficientBalance { available, required }
            }
        }
    }
}

impl From<SqlxError> for RepositoryError {
    fn from(err: SqlxError) -> Self {
        match &err {
            SqlxError::RowNotFound => RepositoryError::NotFound("Record not found".to_string()),
            SqlxError::Database(db_err) => {
                // Check for common PostgreSQL error codes
                let code = db_err.code().map(|c| c.to_string());
                if code.as_deref() == Some("23505") {
                    // Unique violation
                    RepositoryError::Duplicate(db_err.message().to_string())
                } else if code.as_deref() == Some("23503") || code.as_deref() == Some("23514") {
                    // Foreign key / check constraint violation
                    RepositoryError::ConstraintViolation(db_err.message().to_string())
                } else {
                    RepositoryError::Query(err)
                }
            }
            _ => RepositoryError::Query(err),
        }
    }
}
