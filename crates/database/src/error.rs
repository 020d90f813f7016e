use thiserror::Error;

/// Errors surfaced by a [`crate::Backend`].
///
/// Absence of a relation or procedure is tagged separately from every other
/// failure so callers can treat it as a normal negative result.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("relation \"{0}\" does not exist")]
    RelationNotFound(String),

    #[error("function \"{0}\" does not exist")]
    ProcedureNotFound(String),

    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("unsupported filter operator {0:?}")]
    InvalidOperator(String),

    #[error("write to \"{table}\" rejected: {message}")]
    Rejected { table: String, message: String },

    #[error("query against \"{target}\" failed: {message}")]
    Query { target: String, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RelationNotFound(_) | Self::ProcedureNotFound(_))
    }

    pub fn rejected(table: &str, message: impl Into<String>) -> Self {
        Self::Rejected { table: table.to_string(), message: message.into() }
    }

    pub fn query(target: &str, message: impl Into<String>) -> Self {
        Self::Query { target: target.to_string(), message: message.into() }
    }
}
