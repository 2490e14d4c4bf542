use crate::types::DbId;

/// Errors raised by the pure workflow rules.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A project, report or file the caller referred to does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// A step number, status string or step transition is out of bounds.
    #[error("Invalid workflow input: {0}")]
    Validation(String),
}
