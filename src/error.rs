use thiserror::Error;

/// Core error taxonomy. Repositories bubble database errors up unchanged;
/// services translate them into these variants at the engine boundary.
/// Only the frontends turn errors into process exits.
#[derive(Debug, Error)]
pub enum QmdError {
    /// Collection, document, or model absent. For documents, `similar`
    /// carries up to 5 candidate paths for the caller to suggest.
    #[error("not found: {what}")]
    NotFound { what: String, similar: Vec<String> },

    /// Duplicate collection name or (pwd, glob), invalid virtual path,
    /// invalid glob. The store is left untouched.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The LLM provider returned a non-success response, a malformed
    /// body, or the network failed. Callers treat these as retriable.
    #[error("llm provider error: {0}")]
    Llm(String),

    /// Vec table missing, embedding dimension mismatch, or an FTS query
    /// with no valid tokens. Vector operations return empty on these.
    #[error("invalid state: {0}")]
    State(String),

    /// Unable to open the database or run a migration. The process must
    /// roll back and exit non-zero.
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl QmdError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound {
            what: what.into(),
            similar: Vec::new(),
        }
    }

    pub fn not_found_with_similar(what: impl Into<String>, similar: Vec<String>) -> Self {
        Self::NotFound {
            what: what.into(),
            similar,
        }
    }
}

pub type Result<T> = std::result::Result<T, QmdError>;
