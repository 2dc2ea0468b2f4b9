use thiserror::Error;

/// Centralized error types for the application
///
/// Every step function, command handler and collaborator call returns `AppResult`.
/// The router sorts failures by [`ErrorKind`]: business rejections are shown to the
/// user as-is, everything else goes through the containment wrapper.
///
/// # Example
///
/// ```no_run
/// use loyalty_bot::core::error::{AppError, BusinessError};
///
/// let err = AppError::from(BusinessError::ClientNotFound("+79990001122".into()));
/// assert!(err.is_business());
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Collaborator rejected an otherwise well-formed request
    #[error(transparent)]
    Business(#[from] BusinessError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// Outbound delivery errors
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A blocking collaborator task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Engine invariant violations and other internal failures
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn internal(message: impl Into<String>) -> Self {
        AppError::Internal(message.into())
    }

    pub fn is_business(&self) -> bool {
        matches!(self, AppError::Business(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Business(_) => ErrorKind::Business,
            AppError::Transport(_) => ErrorKind::Transport,
            AppError::Database(_) | AppError::DatabasePool(_) => ErrorKind::Storage,
            AppError::Task(_) | AppError::Internal(_) => ErrorKind::Unhandled,
        }
    }
}

/// Coarse classification used in logs and dispatch results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Business,
    Transport,
    Storage,
    Unhandled,
    Panic,
}

/// Rejections raised by business collaborators.
///
/// The `Display` text is what the user sees, so it is written for them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusinessError {
    #[error("❌ Клиент «{0}» не найден")]
    ClientNotFound(String),

    #[error("❌ Недостаточно баллов. Доступно: {available}, запрошено: {requested}")]
    InsufficientBalance { available: i64, requested: i64 },

    #[error("❌ Списать можно не больше {limit} баллов для этой покупки")]
    RedemptionLimit { limit: i64 },

    #[error("❌ Телефон {0} уже зарегистрирован")]
    DuplicatePhone(String),

    #[error("⛔ Недостаточно прав для этой операции")]
    AccessDenied,

    #[error("❌ {0}")]
    Rejected(String),
}

/// Delivery failure on the outbound side of the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Delivery to chat {chat_id} failed: {reason}")]
pub struct TransportError {
    pub chat_id: i64,
    pub reason: String,
}

impl TransportError {
    pub fn new(chat_id: i64, reason: impl Into<String>) -> Self {
        Self {
            chat_id,
            reason: reason.into(),
        }
    }
}

/// User input failed a format check. Handled by re-prompting, never surfaced as a failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid full name: {0:?}")]
    Name(String),

    #[error("invalid phone number: {0:?}")]
    Phone(String),

    #[error("invalid birth date: {0:?}")]
    BirthDate(String),

    #[error("invalid amount: {0:?}")]
    Amount(String),
}
