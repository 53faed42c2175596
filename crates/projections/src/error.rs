//! Handler error types.

use std::time::Duration;

use domain::EventKind;
use read_store::StoreError;
use thiserror::Error;

/// A hard failure of a synchronization handler.
///
/// Every variant aborts the handler and is retried by the consumer.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The event payload did not decode into the kind's typed record.
    #[error("Invalid {kind} payload: {source}")]
    Payload {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },

    /// The payload decoded but its identifier is blank.
    #[error("Invalid {kind} payload: {field} is blank")]
    MissingId {
        kind: EventKind,
        field: &'static str,
    },

    /// A primary-store or search-index step failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// An entity the event refers to does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The handler did not finish within its time budget.
    #[error("Handler timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type for handler operations.
pub type Result<T> = std::result::Result<T, HandlerError>;
