//! Error types for relq

use thiserror::Error;

/// Result type alias for relq operations that may touch the database.
pub type OrmResult<T> = Result<T, OrmError>;

/// Result type alias for pure statement construction.
pub type BuildResult<T> = Result<T, BuildError>;

/// Errors raised while building a statement.
///
/// These never involve I/O. Builders record the first one they hit and report it
/// from [`Statement::statement`](crate::Statement::statement) or the terminal call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A lookup token is neither a field, a relation, nor an annotation.
    #[error("invalid field '{token}' on model '{model}'")]
    InvalidField { token: String, model: String },

    /// A lookup token in operator position is not a known operator.
    #[error("invalid operator '{token}' on model '{model}'")]
    InvalidOperator { token: String, model: String },

    /// A list value was empty where at least one element is required.
    #[error("empty list: {0}")]
    EmptyList(String),

    /// The value has no SQL text form in the requested mode.
    #[error("don't know how to escape value of type {0}")]
    Unescapable(String),

    /// No key columns could be chosen for a bulk write.
    #[error("no key for bulk write on model '{0}'")]
    NoKey(String),

    /// A bulk write resolved to an empty column set.
    #[error("no columns for bulk write on model '{0}'")]
    NoColumns(String),

    /// A model name was not registered in the schema.
    #[error("unknown model '{0}'")]
    UnknownModel(String),

    /// Any other construction error.
    #[error("{0}")]
    Invalid(String),
}

impl BuildError {
    pub(crate) fn invalid_field(token: impl Into<String>, model: impl Into<String>) -> Self {
        Self::InvalidField {
            token: token.into(),
            model: model.into(),
        }
    }

    pub(crate) fn invalid_operator(token: impl Into<String>, model: impl Into<String>) -> Self {
        Self::InvalidOperator {
            token: token.into(),
            model: model.into(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// Error types for relq operations
#[derive(Debug, Error)]
pub enum OrmError {
    /// Statement construction error
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Schema linking error
    #[error("Schema error: {0}")]
    Schema(String),

    /// Query execution error, passed through unmodified
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Query timeout error
    #[error("Query timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    /// SQLSTATE code of the underlying database error, if any.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Self::Query(err) => err.as_db_error().map(|db| db.code().code()),
            _ => None,
        }
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        self.sqlstate() == Some("23505")
    }

    /// Check if this is a foreign key violation error
    pub fn is_foreign_key_violation(&self) -> bool {
        self.sqlstate() == Some("23503")
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if this is a construction error
    pub fn is_build(&self) -> bool {
        matches!(self, Self::Build(_))
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for OrmError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
