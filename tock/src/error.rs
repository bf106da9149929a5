//! Error types for the tock engine

use crate::config::ConfigError;
use crate::types::TickId;
use bodymap_types::{ActionRef, SyncId};
use thiserror::Error;

/// Engine-level failure.
///
/// Action-level failures (an `{error}` output) are *not* represented here:
/// they are ordinary outcomes that syncs match on. An `EngineError` is fatal
/// to the tick that raised it and to nothing else.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No action registered under this reference
    #[error("unknown action: {0}")]
    UnknownAction(ActionRef),

    /// No query registered under this reference
    #[error("unknown query: {0}")]
    UnknownQuery(ActionRef),

    /// No custom predicate registered under this name
    #[error("unknown predicate: {0}")]
    UnknownPredicate(String),

    /// The engine configuration is out of range
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// Static validation of a sync failed
    #[error("invalid sync {sync}: {reason}")]
    InvalidSync { sync: SyncId, reason: String },

    /// A `then` template referenced a variable the frame does not bind
    #[error("sync {sync} references unbound variable ?{variable}")]
    UnboundVariable { sync: SyncId, variable: String },

    /// The action raised an error instead of returning an output variant
    #[error("action {action} failed: {source}")]
    ActionFailed {
        action: ActionRef,
        #[source]
        source: ActionError,
    },

    /// A `where` query raised an error
    #[error("query {query} failed: {source}")]
    QueryFailed {
        query: ActionRef,
        #[source]
        source: QueryError,
    },

    /// The action returned a record that matches none of its declared variants
    #[error("action {action} returned fields {fields:?}, which match no declared variant")]
    UnrecognizedVariant {
        action: ActionRef,
        fields: Vec<String>,
    },

    /// The Evaluating/Dispatching loop did not reach a fixpoint in time
    #[error("tick {tick} aborted: no fixpoint after {iterations} dispatching rounds")]
    CycleBoundExceeded { tick: TickId, iterations: usize },

    /// The task running the tick was cancelled before it finished
    #[error("tick {tick} was interrupted before completing")]
    TickInterrupted { tick: TickId },
}

/// Error raised by an action implementation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ActionError {
    pub message: String,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error raised by a query implementation.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    /// The query rejected its input
    #[error("invalid query input: {0}")]
    InvalidInput(String),

    /// The query could not read its backing state
    #[error("query failed: {0}")]
    Failed(String),
}

/// Result type using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;
