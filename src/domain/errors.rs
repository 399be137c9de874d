use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// The transport session could not be opened (unreachable host, TLS, authentication).
    #[error("Connection error: {0}")]
    Connection(String),
    /// A single folder, message or restore item failed; processing continues.
    #[error("Transient error: {0}")]
    Transient(String),
    #[error("Too many items: {requested} requested, limit is {limit}")]
    Capacity { requested: usize, limit: usize },
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
    #[error("Entity not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    /// Errors that make the rest of an account's sync pass pointless.
    pub fn is_account_level(&self) -> bool {
        matches!(self, DomainError::Connection(_) | DomainError::Storage(_))
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Io(err.to_string())
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
