//! Engine error taxonomy.

use thiserror::Error;

use crate::registry::RegistryError;

/// Errors raised by the flow engines.
///
/// Conflicts are not listed here; they come back as [`crate::models::Outcome::Blocked`].
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cannot {action} {entity} {id} while {from}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        action: &'static str,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Unreadable schedule file: {0}")]
    UnreadableFile(String),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

pub type FlowResult<T> = Result<T, FlowError>;

impl FlowError {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        FlowError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub(crate) fn transition(
        entity: &'static str,
        id: impl Into<String>,
        from: impl std::fmt::Display,
        action: &'static str,
    ) -> Self {
        FlowError::InvalidTransition {
            entity,
            id: id.into(),
            from: from.to_string(),
            action,
        }
    }

    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, FlowError::InvalidTransition { .. })
    }
}

impl<T> From<std::sync::PoisonError<T>> for FlowError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        FlowError::LockPoisoned(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_message() {
        let err = FlowError::transition("entry", "e1", "checked_in", "check in");
        assert_eq!(err.to_string(), "Cannot check in entry e1 while checked_in");
        assert!(err.is_invalid_transition());
    }

    #[test]
    fn test_not_found_message() {
        let err = FlowError::not_found("Pre-consultation", "pc-9");
        assert_eq!(err.to_string(), "Pre-consultation not found: pc-9");
    }
}
