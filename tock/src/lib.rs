//! Tock: a declarative synchronization engine
//!
//! Concepts expose actions and queries through an [`ActionRegistry`]. Syncs
//! are when/where/then rules: when a set of action occurrences joins on shared
//! variables, optionally enriched and filtered by read-only queries, the sync
//! invokes further actions. One external invocation and everything it
//! cascades into is a *tick*, run to fixpoint by the [`Engine`].
//!
//! # Example
//!
//! ```ignore
//! let mut registry = ActionRegistry::builder();
//! registry.concept(requesting.clone()).concept(auth.clone());
//!
//! let table = SyncTable::from_yaml_str(AUTH_SYNCS)?;
//! let engine = Engine::new(registry.build(), &table, EngineConfig::default())?;
//!
//! let report = engine
//!     .invoke(&ActionRef::new("Requesting", "request"), input)
//!     .await?;
//! println!("{}", report.render_trace());
//! ```

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod frame;
pub mod log;
pub mod metrics;
pub mod outcome;
pub mod pattern;
pub mod registry;
pub mod report;
pub mod sync;
pub mod term;
pub mod transform;
pub mod types;

pub use config::{ConfigError, DispatchMode, EngineConfig};
pub use engine::Engine;
pub use error::{ActionError, EngineError, QueryError, Result};
pub use frame::{Frame, FrameKey};
pub use log::{Cause, FiredSet, Occurrence, OccurrenceLog};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use outcome::{ActionDescriptor, Outcome, OutcomeKind, Variant, ERROR_FIELD};
pub use pattern::{match_when, ActionPattern, Match, WhenPattern};
pub use registry::{
    Action, ActionRegistry, AsyncFnAction, Concept, FnAction, FnQuery, PredicateFn, Query,
    RegistryBuilder,
};
pub use report::TickReport;
pub use sync::{CompiledSync, Predicate, SyncBuilder, SyncRule, SyncTable, ThenTemplate, WhereStep};
pub use term::{Term, VarRef};
pub use types::{Seq, TickId, TickPhase};

pub use bodymap_types::{record, ActionRef, Record, SyncId, Value};
