use thiserror::Error;

/// Error kinds surfaced by the durability and concurrency core.
///
/// Every fallible operation returns a [`Result`] carrying either a value or
/// one of these variants. Callers (the executor, catalog, and other
/// collaborators outside this crate) map these onto their own
/// `{code, message, context}` representation; see [`CoreError::code`].
#[derive(Error, Debug)]
pub enum CoreError {
    /// The underlying VFS failed a read/write/fsync/open/truncate.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid magic, CRC mismatch, unknown page/frame type, out-of-range
    /// cell counts, or a torn tail beyond recovery.
    #[error("data corruption: {0}")]
    Corruption(String),

    /// Pass-through for SQL-level constraint violations (NOT NULL, UNIQUE,
    /// FK). The core does not enforce these itself.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Nested `beginTransaction`, commit/rollback without an active
    /// transaction, or an operation on a closed database.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Cache exhaustion during eviction: every cached entry is pinned,
    /// dirty-and-in-transaction, or otherwise unevictable.
    #[error("resource exhausted: {0}")]
    Resource(String),

    /// Reserved for SQL-layer callers; the core itself never returns this.
    #[error("SQL error: {0}")]
    Sql(String),

    /// An invariant the core itself is responsible for was violated. Should
    /// be impossible; indicates a bug in this crate.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Stable string code for the `{code, message, context}` JSON shape
    /// required by callers that need to serialize errors across a process
    /// boundary (see distilled spec §7).
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Io(_) => "ERR_IO",
            CoreError::Corruption(_) => "ERR_CORRUPTION",
            CoreError::Constraint(_) => "ERR_CONSTRAINT",
            CoreError::Transaction(_) => "ERR_TRANSACTION",
            CoreError::Resource(_) => "ERR_RESOURCE",
            CoreError::Sql(_) => "ERR_SQL",
            CoreError::Internal(_) => "ERR_INTERNAL",
        }
    }

    pub fn corruption(msg: impl Into<String>) -> Self {
        CoreError::Corruption(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CoreError::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_stable_per_variant() {
        assert_eq!(CoreError::corruption("x").code(), "ERR_CORRUPTION");
        assert_eq!(CoreError::internal("x").code(), "ERR_INTERNAL");
        assert_eq!(
            CoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "x")).code(),
            "ERR_IO"
        );
    }
}
