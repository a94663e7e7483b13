/// Errors produced by storage adapters and the unified CRUD engine.
///
/// Adapters wrap native driver failures into this taxonomy before raising, so
/// callers can match on the failure class without depending on driver crates.
#[derive(Debug)]
pub enum StorageError {
    /// The backend is unreachable or the connection handshake failed.
    Connection(String),
    /// The requested id does not exist.
    NotFound(String),
    /// A uniqueness constraint was violated.
    Duplicate(String),
    /// Schema or identifier validation failed.
    Validation(String),
    /// The backend rejected a query.
    Query(String),
    /// A commit failed or a rollback is required.
    Transaction(String),
    /// A binding is missing or the model metadata is unusable.
    Configuration(String),
    /// A security check denied the operation.
    Permission(String),
    /// The operation exceeded its deadline.
    Timeout(String),
    /// Fallback wrapping of a backend exception.
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl StorageError {
    /// Wrap any driver error into the `Backend` variant.
    ///
    /// Used by adapter crates to bridge driver-specific errors without
    /// leaking their types through the public API.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StorageError::Backend(Box::new(err))
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Connection(msg) => write!(f, "Connection error: {msg}"),
            StorageError::NotFound(msg) => write!(f, "Not found: {msg}"),
            StorageError::Duplicate(msg) => write!(f, "Duplicate: {msg}"),
            StorageError::Validation(msg) => write!(f, "Validation error: {msg}"),
            StorageError::Query(msg) => write!(f, "Query error: {msg}"),
            StorageError::Transaction(msg) => write!(f, "Transaction error: {msg}"),
            StorageError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            StorageError::Permission(msg) => write!(f, "Permission denied: {msg}"),
            StorageError::Timeout(msg) => write!(f, "Timeout: {msg}"),
            StorageError::Backend(err) => write!(f, "Storage error: {err}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Backend(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_class_and_message() {
        let err = StorageError::NotFound("doc 42".into());
        assert_eq!(err.to_string(), "Not found: doc 42");

        let err = StorageError::Permission("No write permission".into());
        assert_eq!(err.to_string(), "Permission denied: No write permission");
    }

    #[test]
    fn backend_preserves_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = StorageError::backend(io);
        assert!(std::error::Error::source(&err).is_some());
    }
}
