//! Typed error handling for the persistence layer
//!
//! Every failure a provider, the registry or the transaction manager can
//! report is a [`StoreError`]. Callers branch on the variant (or on
//! [`StoreError::is_not_found`]) rather than parsing messages.
//!
//! # Error Categories
//!
//! - `NotFound` / `AlreadyExists`: record-level outcomes, always recoverable
//! - `InvalidFilter` / `InvalidQuery`: list parameters rejected at the boundary
//! - `ProviderNotRegistered` / `AlreadyRegistered`: composition-time misconfiguration
//! - [`TransactionError`]: the unit of work was rolled back or could not commit
//! - `BackendUnavailable` / `Backend`: connectivity and backend-side failures
//!
//! # Example
//!
//! ```rust,ignore
//! match provider.read(&ctx, "order-1").await {
//!     Ok(record) => println!("Found: {:?}", record),
//!     Err(e) if e.is_not_found() => println!("No such order"),
//!     Err(e) => return Err(e),
//! }
//! ```

use thiserror::Error;

/// The main error type for persistence operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record (or table) absent
    #[error("{table} with id '{id}' not found")]
    NotFound { table: String, id: String },

    /// A record with the same identifier already exists
    #[error("{table} with id '{id}' already exists")]
    AlreadyExists { table: String, id: String },

    /// Malformed operator/kind combination or filter operand
    #[error("Invalid filter on field '{field}': {message}")]
    InvalidFilter { field: String, message: String },

    /// Malformed pagination, sort or search parameters
    #[error("Invalid list query: {message}")]
    InvalidQuery { message: String },

    /// No constructor registered for the pair
    #[error("provider not registered: '{provider}' for entity '{entity}'")]
    ProviderNotRegistered { provider: String, entity: String },

    /// The pair was registered twice during composition
    #[error("provider '{provider}' already registered for entity '{entity}'")]
    AlreadyRegistered { provider: String, entity: String },

    /// The unit of work failed and was rolled back, or could not commit
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Connectivity failure or expired deadline
    #[error("Storage backend '{backend}' is unavailable: {message}")]
    BackendUnavailable { backend: String, message: String },

    /// The backend rejected an operation
    #[error("{backend} {operation} failed on '{table}': {message}")]
    Backend {
        backend: String,
        operation: String,
        table: String,
        message: String,
    },

    /// Failed to convert between records and backend documents
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// The backend does not offer this operation
    #[error("{backend} does not support {operation}")]
    Unsupported { backend: String, operation: String },

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by the transaction manager
#[derive(Debug, Error)]
pub enum TransactionError {
    /// The unit of work failed and every change was rolled back
    #[error("Transaction {id} rolled back: {cause}")]
    RolledBack { id: String, cause: Box<StoreError> },

    /// A nested call failed but the outer unit of work tried to succeed
    #[error("Transaction {id} rolled back: a nested operation failed")]
    RollbackOnly { id: String },

    /// The unit of work panicked
    #[error("Transaction {id} aborted: {message}")]
    Aborted { id: String, message: String },

    /// The backend rejected the commit
    #[error("Transaction {id} failed to commit: {message}")]
    CommitFailed { id: String, message: String },

    /// The backend could not open a transaction
    #[error("Failed to begin transaction: {message}")]
    BeginFailed { message: String },

    /// The handle does not belong to this backend or is already closed
    #[error("Invalid transaction handle: {message}")]
    InvalidHandle { message: String },
}

impl StoreError {
    /// Get the error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "NOT_FOUND",
            StoreError::AlreadyExists { .. } => "ALREADY_EXISTS",
            StoreError::InvalidFilter { .. } => "INVALID_FILTER",
            StoreError::InvalidQuery { .. } => "INVALID_QUERY",
            StoreError::ProviderNotRegistered { .. } => "PROVIDER_NOT_REGISTERED",
            StoreError::AlreadyRegistered { .. } => "PROVIDER_ALREADY_REGISTERED",
            StoreError::Transaction(e) => e.error_code(),
            StoreError::BackendUnavailable { .. } => "BACKEND_UNAVAILABLE",
            StoreError::Backend { .. } => "BACKEND_ERROR",
            StoreError::Serialization { .. } => "SERIALIZATION_ERROR",
            StoreError::Unsupported { .. } => "UNSUPPORTED_OPERATION",
            StoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Follow rolled-back transactions down to the error that caused them
    pub fn root_cause(&self) -> &StoreError {
        match self {
            StoreError::Transaction(TransactionError::RolledBack { cause, .. }) => {
                cause.root_cause()
            }
            other => other,
        }
    }

    /// Whether the (root) error is a not-found outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), StoreError::NotFound { .. })
    }

    pub fn not_found(table: impl Into<String>, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            table: table.into(),
            id: id.into(),
        }
    }

    pub fn invalid_filter(field: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::InvalidFilter {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        StoreError::InvalidQuery {
            message: message.into(),
        }
    }

    pub fn backend(
        backend: &str,
        operation: &str,
        table: &str,
        message: impl std::fmt::Display,
    ) -> Self {
        StoreError::Backend {
            backend: backend.to_string(),
            operation: operation.to_string(),
            table: table.to_string(),
            message: message.to_string(),
        }
    }

    pub fn unavailable(backend: &str, message: impl std::fmt::Display) -> Self {
        StoreError::BackendUnavailable {
            backend: backend.to_string(),
            message: message.to_string(),
        }
    }
}

impl TransactionError {
    pub fn error_code(&self) -> &'static str {
        match self {
            TransactionError::RolledBack { .. } => "TRANSACTION_ROLLED_BACK",
            TransactionError::RollbackOnly { .. } => "TRANSACTION_ROLLED_BACK",
            TransactionError::Aborted { .. } => "TRANSACTION_ABORTED",
            TransactionError::CommitFailed { .. } => "TRANSACTION_COMMIT_FAILED",
            TransactionError::BeginFailed { .. } => "TRANSACTION_BEGIN_FAILED",
            TransactionError::InvalidHandle { .. } => "TRANSACTION_INVALID_HANDLE",
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization {
            message: err.to_string(),
        }
    }
}

/// A specialized Result type for persistence operations
pub type StoreResult<T> = Result<T, StoreError>;
