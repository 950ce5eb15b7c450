//! Core error taxonomy shared by sync, list and service layers.
//!
//! # Invariants
//! - Input validation failures are returned synchronously to callers.
//! - Transport failures (`ConnectionError`) are retryable by the caller.
//! - Backend rejections (`StorageError`) are not; retrying repeats them.
//! - `SubscriptionError` is terminal for the subscription that raised it.

use crate::model::item::{ItemId, ItemValidationError};
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type TodoResult<T> = Result<T, TodoError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodoError {
    /// No principal is signed in for a partition-scoped operation.
    NotAuthenticated,
    /// Empty or malformed item input.
    InvalidInput(ItemValidationError),
    /// Transient transport failure; callers may retry with backoff.
    ConnectionError(String),
    /// Terminal delivery failure; a new subscription is required.
    SubscriptionError(String),
    /// Target id is absent from the latest known snapshot.
    StaleReference(ItemId),
    /// Store rejected the write (constraint, corruption, schema mismatch).
    StorageError(String),
}

impl TodoError {
    /// Stable machine-readable code used in log events and FFI envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "not_authenticated",
            Self::InvalidInput(_) => "invalid_input",
            Self::ConnectionError(_) => "connection_error",
            Self::SubscriptionError(_) => "subscription_error",
            Self::StaleReference(_) => "stale_reference",
            Self::StorageError(_) => "storage_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionError(_))
    }
}

impl Display for TodoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAuthenticated => write!(f, "no signed-in principal"),
            Self::InvalidInput(err) => write!(f, "invalid input: {err}"),
            Self::ConnectionError(message) => write!(f, "connection error: {message}"),
            Self::SubscriptionError(message) => write!(f, "subscription error: {message}"),
            Self::StaleReference(id) => write!(f, "item not in latest snapshot: {id}"),
            Self::StorageError(message) => write!(f, "storage error: {message}"),
        }
    }
}

impl Error for TodoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidInput(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ItemValidationError> for TodoError {
    fn from(value: ItemValidationError) -> Self {
        Self::InvalidInput(value)
    }
}

impl From<StoreError> for TodoError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Unavailable(message) => Self::ConnectionError(message),
            StoreError::Backend(message) => Self::StorageError(message),
            StoreError::PermissionDenied(_) => Self::NotAuthenticated,
            StoreError::NotFound(id) => Self::StaleReference(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TodoError;
    use crate::model::item::ItemValidationError;
    use crate::store::StoreError;

    #[test]
    fn store_errors_map_onto_taxonomy() {
        assert_eq!(
            TodoError::from(StoreError::Unavailable("offline".to_string())),
            TodoError::ConnectionError("offline".to_string())
        );
        assert_eq!(
            TodoError::from(StoreError::NotFound("abc".to_string())),
            TodoError::StaleReference("abc".to_string())
        );
        assert_eq!(
            TodoError::from(StoreError::PermissionDenied("u1".to_string())),
            TodoError::NotAuthenticated
        );
        assert_eq!(
            TodoError::from(StoreError::Backend("CHECK constraint failed".to_string())),
            TodoError::StorageError("CHECK constraint failed".to_string())
        );
    }

    #[test]
    fn only_connection_errors_are_retryable() {
        assert!(TodoError::ConnectionError("x".to_string()).is_retryable());
        assert!(!TodoError::SubscriptionError("x".to_string()).is_retryable());
        assert!(!TodoError::InvalidInput(ItemValidationError::EmptyText).is_retryable());
        assert!(!TodoError::StorageError("disk full".to_string()).is_retryable());
        assert_eq!(TodoError::StorageError("x".to_string()).code(), "storage_error");
    }
}
