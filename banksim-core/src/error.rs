//! Error types for the banking core

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for banking core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Banking core errors
#[derive(Error, Debug)]
pub enum Error {
    /// Customer, account or transaction lookup miss
    #[error("Not found: {0}")]
    NotFound(String),

    /// Aadhar number already registered
    #[error("Customer already registered with Aadhar number {0}")]
    DuplicateIdentity(String),

    /// Account number already in use
    #[error("Account number {0} already exists")]
    DuplicateAccount(String),

    /// No customer owns the Aadhar number supplied for a new account
    #[error("No customer found for Aadhar number {0}")]
    UnknownOwner(String),

    /// Format or range violation on an input field
    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        /// Field name as it appears on the wire
        field: &'static str,
        /// What the value failed to satisfy
        reason: String,
    },

    /// Attempt to change a field that is fixed after creation
    #[error("Field '{0}' cannot be modified")]
    ImmutableField(&'static str),

    /// PIN did not verify
    #[error("Invalid PIN. Transaction denied")]
    InvalidPin,

    /// Transfer referenced an unknown account
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Account exists but is not Active
    #[error("Account {0} is not active")]
    AccountNotActive(String),

    /// Sender and receiver are the same account
    #[error("Sender and receiver account numbers must be different")]
    SelfTransfer,

    /// Debit would drive the balance negative
    #[error("Insufficient balance in account {account}: available {available}")]
    InsufficientFunds {
        /// Account being debited
        account: String,
        /// Balance at the time of the check
        available: rust_decimal::Decimal,
    },

    /// Account lock not acquired within the configured window
    #[error("Timed out waiting for lock on {0}")]
    LockTimeout(String),

    /// Idempotency key already used for a different request
    #[error("Idempotency key {0} was already used for a different transfer")]
    IdempotencyConflict(String),

    /// Storage error (RocksDB)
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, task aborted, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Broken internal invariant
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for [`Error::InvalidField`]
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code for the boundary layer
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NOT_FOUND",
            Error::DuplicateIdentity(_) => "DUPLICATE_IDENTITY",
            Error::DuplicateAccount(_) => "DUPLICATE_ACCOUNT",
            Error::UnknownOwner(_) => "UNKNOWN_OWNER",
            Error::InvalidField { .. } => "INVALID_FIELD",
            Error::ImmutableField(_) => "IMMUTABLE_FIELD",
            Error::InvalidPin => "INVALID_PIN",
            Error::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Error::AccountNotActive(_) => "ACCOUNT_NOT_ACTIVE",
            Error::SelfTransfer => "SELF_TRANSFER",
            Error::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Error::LockTimeout(_) => "LOCK_TIMEOUT",
            Error::IdempotencyConflict(_) => "IDEMPOTENCY_CONFLICT",
            Error::PersistenceFailure(_) | Error::Serialization(_) | Error::Io(_) => {
                "PERSISTENCE_FAILURE"
            }
            Error::Concurrency(_) | Error::Config(_) | Error::Internal(_) => "INTERNAL",
        }
    }

    /// Whether retrying the same storage operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::PersistenceFailure(_) | Error::Io(_) | Error::LockTimeout(_)
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::PersistenceFailure(err.to_string())
    }
}

/// Wire form of an error: stable code plus human message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code, see [`Error::code`]
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}
