//! Action and query registry
//!
//! The registry is the static table the engine resolves `Concept.action`
//! references against. It is assembled once with a [`RegistryBuilder`] and
//! is immutable afterwards.
//!
//! # Customization Points
//!
//! - [`Action`]: a state-mutating operation returning one output variant
//! - [`Query`]: a read-only operation returning zero or more rows
//! - [`Concept`]: a bundle of actions and queries that registers itself
//! - custom predicates: named frame filters usable from `where` steps

use crate::error::{ActionError, EngineError, QueryError, Result};
use crate::frame::Frame;
use crate::outcome::{ActionDescriptor, Outcome, Variant};
use async_trait::async_trait;
use bodymap_types::{ActionRef, Record};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A state-mutating concept operation.
///
/// Which output variant was produced is signalled only by the fields of the
/// returned record. Returning `Err` means the action could not produce any
/// variant at all, which the engine treats as fatal to the tick.
#[async_trait]
pub trait Action: Send + Sync {
    async fn invoke(&self, input: Record) -> std::result::Result<Record, ActionError>;
}

/// A read-only concept operation usable from `where` steps.
#[async_trait]
pub trait Query: Send + Sync {
    async fn query(&self, input: Record) -> std::result::Result<Vec<Record>, QueryError>;
}

/// A component that owns state and exposes actions and queries.
pub trait Concept: Send + Sync + 'static {
    /// Concept name as used in `Concept.action` references
    fn name(&self) -> &str;

    /// Register this concept's actions and queries.
    fn register(self: Arc<Self>, registry: &mut RegistryBuilder);
}

/// Frame predicate registered by name, the escape hatch for filters the
/// declarative predicates cannot express.
pub type PredicateFn = Arc<dyn Fn(&Frame) -> bool + Send + Sync>;

/// An [`Action`] backed by a synchronous closure
pub struct FnAction<F>(pub F);

#[async_trait]
impl<F> Action for FnAction<F>
where
    F: Fn(Record) -> std::result::Result<Record, ActionError> + Send + Sync,
{
    async fn invoke(&self, input: Record) -> std::result::Result<Record, ActionError> {
        (self.0)(input)
    }
}

/// An [`Action`] backed by a closure returning a future
pub struct AsyncFnAction<F>(pub F);

#[async_trait]
impl<F, Fut> Action for AsyncFnAction<F>
where
    F: Fn(Record) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Record, ActionError>> + Send + 'static,
{
    async fn invoke(&self, input: Record) -> std::result::Result<Record, ActionError> {
        (self.0)(input).await
    }
}

/// A [`Query`] backed by a synchronous closure
pub struct FnQuery<F>(pub F);

#[async_trait]
impl<F> Query for FnQuery<F>
where
    F: Fn(Record) -> std::result::Result<Vec<Record>, QueryError> + Send + Sync,
{
    async fn query(&self, input: Record) -> std::result::Result<Vec<Record>, QueryError> {
        (self.0)(input)
    }
}

struct ActionEntry {
    descriptor: ActionDescriptor,
    handler: Arc<dyn Action>,
}

/// Collects actions, queries and predicates before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    actions: HashMap<ActionRef, ActionEntry>,
    queries: HashMap<ActionRef, Arc<dyn Query>>,
    predicates: HashMap<String, PredicateFn>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action under its descriptor.
    pub fn action(&mut self, descriptor: ActionDescriptor, handler: impl Action + 'static) -> &mut Self {
        self.action_arc(descriptor, Arc::new(handler))
    }

    /// Register an already shared action handler.
    pub fn action_arc(&mut self, descriptor: ActionDescriptor, handler: Arc<dyn Action>) -> &mut Self {
        let key = descriptor.action.clone();
        if self.actions.contains_key(&key) {
            tracing::warn!(action = %key, "action registered twice, keeping the latest");
        }
        self.actions.insert(
            key,
            ActionEntry {
                descriptor,
                handler,
            },
        );
        self
    }

    /// Register a synchronous closure as an action with the given variants.
    pub fn action_fn<F>(&mut self, action: ActionRef, variants: Vec<Variant>, f: F) -> &mut Self
    where
        F: Fn(Record) -> std::result::Result<Record, ActionError> + Send + Sync + 'static,
    {
        let descriptor = ActionDescriptor {
            action,
            variants,
        };
        self.action(descriptor, FnAction(f))
    }

    /// Register a query.
    pub fn query(&mut self, query: ActionRef, handler: impl Query + 'static) -> &mut Self {
        self.query_arc(query, Arc::new(handler))
    }

    /// Register an already shared query handler.
    pub fn query_arc(&mut self, query: ActionRef, handler: Arc<dyn Query>) -> &mut Self {
        if self.queries.contains_key(&query) {
            tracing::warn!(query = %query, "query registered twice, keeping the latest");
        }
        self.queries.insert(query, handler);
        self
    }

    /// Register a synchronous closure as a query.
    pub fn query_fn<F>(&mut self, query: ActionRef, f: F) -> &mut Self
    where
        F: Fn(Record) -> std::result::Result<Vec<Record>, QueryError> + Send + Sync + 'static,
    {
        self.query(query, FnQuery(f))
    }

    /// Register a named custom predicate.
    pub fn predicate<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&Frame) -> bool + Send + Sync + 'static,
    {
        self.predicates.insert(name.into(), Arc::new(f));
        self
    }

    /// Let a concept register everything it exposes.
    pub fn concept<C: Concept>(&mut self, concept: Arc<C>) -> &mut Self {
        tracing::debug!(concept = concept.name(), "registering concept");
        concept.register(self);
        self
    }

    /// Freeze the registry.
    pub fn build(self) -> ActionRegistry {
        ActionRegistry {
            actions: self.actions,
            queries: self.queries,
            predicates: self.predicates,
        }
    }
}

/// Frozen table of actions, queries and predicates.
pub struct ActionRegistry {
    actions: HashMap<ActionRef, ActionEntry>,
    queries: HashMap<ActionRef, Arc<dyn Query>>,
    predicates: HashMap<String, PredicateFn>,
}

impl ActionRegistry {
    /// Start assembling a registry
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Declared variants of a registered action
    pub fn descriptor(&self, action: &ActionRef) -> Option<&ActionDescriptor> {
        self.actions.get(action).map(|entry| &entry.descriptor)
    }

    pub fn has_action(&self, action: &ActionRef) -> bool {
        self.actions.contains_key(action)
    }

    pub fn has_query(&self, query: &ActionRef) -> bool {
        self.queries.contains_key(query)
    }

    /// A custom predicate by name
    pub fn predicate(&self, name: &str) -> Option<&PredicateFn> {
        self.predicates.get(name)
    }

    /// All registered action references, sorted
    pub fn actions(&self) -> Vec<&ActionRef> {
        let mut refs: Vec<_> = self.actions.keys().collect();
        refs.sort();
        refs
    }

    /// All registered query references, sorted
    pub fn queries(&self) -> Vec<&ActionRef> {
        let mut refs: Vec<_> = self.queries.keys().collect();
        refs.sort();
        refs
    }

    /// Invoke an action and classify its result.
    ///
    /// This is the single ingestion point: the engine uses it both to seed a
    /// tick and to fire `then` templates.
    pub async fn invoke(&self, action: &ActionRef, input: Record) -> Result<Outcome> {
        let entry = self
            .actions
            .get(action)
            .ok_or_else(|| EngineError::UnknownAction(action.clone()))?;

        let output = entry
            .handler
            .invoke(input)
            .await
            .map_err(|source| EngineError::ActionFailed {
                action: action.clone(),
                source,
            })?;

        entry.descriptor.classify(output)
    }

    /// Run a query.
    pub async fn query(&self, query: &ActionRef, input: Record) -> Result<Vec<Record>> {
        let handler = self
            .queries
            .get(query)
            .ok_or_else(|| EngineError::UnknownQuery(query.clone()))?;

        handler
            .query(input)
            .await
            .map_err(|source| EngineError::QueryFailed {
                query: query.clone(),
                source,
            })
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.actions())
            .field("queries", &self.queries())
            .field("predicates", &self.predicates.keys().collect::<Vec<_>>())
            .finish()
    }
}
