//! Typed error hierarchy for the board engine.
//!
//! Two enums cover the two failure surfaces:
//! - `BoardError`: validation failures, reported before any local mutation
//! - `StoreError`: remote store failures, reported after an optimistic
//!   mutation and answered with a rollback

use thiserror::Error;

use crate::board::models::{GroupId, ItemId};

/// Errors returned synchronously by the controller, planner and sync engine.
///
/// None of these leave the board modified: validation runs before the
/// optimistic apply step.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Group {id} not found")]
    GroupNotFound { id: GroupId },

    #[error("Item {id} not found")]
    ItemNotFound { id: ItemId },

    #[error("Item reference '{prefix}' is ambiguous ({matches} matches)")]
    AmbiguousItem { prefix: String, matches: usize },

    #[error("A drag session is already active for item {active}")]
    DragInProgress { active: ItemId },

    #[error("No drag session is active")]
    NoActiveDrag,

    #[error("Title must not be empty")]
    InvalidTitle,

    #[error("Invalid move plan: {0}")]
    InvalidPlan(String),

    #[error("No async runtime available to issue store writes")]
    NoRuntime,

    #[error("Board state lock poisoned")]
    LockPoisoned,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Failures reported by a `BoardStore` implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found in store")]
    NotFound { entity: &'static str, id: String },

    #[error("Write conflict on {entity} {id}")]
    Conflict { entity: &'static str, id: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Write rejected: {0}")]
    Rejected(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

pub type BoardResult<T> = Result<T, BoardError>;
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_not_found_carries_id() {
        let err = BoardError::GroupNotFound {
            id: GroupId::from("stage-won"),
        };
        match &err {
            BoardError::GroupNotFound { id } => assert_eq!(id.as_str(), "stage-won"),
            _ => panic!("Expected GroupNotFound"),
        }
        assert!(err.to_string().contains("stage-won"));
    }

    #[test]
    fn board_error_converts_from_store_error() {
        let inner = StoreError::Unavailable("connection reset".to_string());
        let err: BoardError = inner.into();
        match &err {
            BoardError::Store(StoreError::Unavailable(msg)) => {
                assert_eq!(msg, "connection reset");
            }
            _ => panic!("Expected BoardError::Store(Unavailable(...))"),
        }
    }

    #[test]
    fn store_error_not_found_names_entity() {
        let err = StoreError::NotFound {
            entity: "item",
            id: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "item abc not found in store");
    }

    #[test]
    fn rusqlite_errors_become_database_errors() {
        let err: StoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&BoardError::NoActiveDrag);
        assert_std_error(&StoreError::Rejected("x".into()));
    }
}
