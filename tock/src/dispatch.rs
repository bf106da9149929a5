//! `then`-clause dispatch
//!
//! A [`Firing`] is one (sync, frame) pair discovered by an evaluating pass.
//! The dispatcher fires a batch of them, each running its templates in
//! declared order, and returns what they produced without touching the log;
//! the scheduler appends the results once the whole batch has settled.

use crate::error::{EngineError, Result};
use crate::frame::{Frame, FrameKey};
use crate::log::Cause;
use crate::metrics::EngineMetrics;
use crate::outcome::Outcome;
use crate::registry::ActionRegistry;
use crate::sync::{CompiledSync, ThenTemplate};
use crate::types::Seq;
use bodymap_types::{ActionRef, Record};
use futures::stream::{self, StreamExt};

/// A (sync, total frame) pair ready to dispatch.
#[derive(Debug, Clone)]
pub struct Firing<'s> {
    pub sync: &'s CompiledSync,
    pub frame: Frame,
    pub key: FrameKey,
    /// Occurrences matched by the sync's `when` clause
    pub matched: Vec<Seq>,
}

impl Firing<'_> {
    pub fn cause(&self) -> Cause {
        Cause {
            sync: self.sync.id().clone(),
            frame: self.key,
            matched: self.matched.clone(),
        }
    }
}

/// An invocation that completed but is not yet in the log.
#[derive(Debug, Clone)]
pub struct Pending {
    pub action: ActionRef,
    pub input: Record,
    pub outcome: Outcome,
    pub cause: Cause,
}

/// What one firing produced.
///
/// When a template fails, `recorded` holds the invocations that completed
/// before it and the remaining templates are skipped.
#[derive(Debug)]
pub struct FiringResult {
    pub recorded: Vec<Pending>,
    pub error: Option<EngineError>,
}

pub struct Dispatcher<'a> {
    registry: &'a ActionRegistry,
    metrics: &'a EngineMetrics,
}

impl<'a> Dispatcher<'a> {
    pub fn new(registry: &'a ActionRegistry, metrics: &'a EngineMetrics) -> Self {
        Self { registry, metrics }
    }

    /// Invoke one action through the registry.
    pub async fn invoke(&self, action: &ActionRef, input: Record) -> Result<Outcome> {
        self.metrics.record_action();
        self.registry.invoke(action, input).await
    }

    /// Run every template of one firing, in order.
    pub async fn fire(&self, firing: &Firing<'_>) -> FiringResult {
        let cause = firing.cause();
        let mut recorded = Vec::with_capacity(firing.sync.rule.then.len());

        for template in &firing.sync.rule.then {
            match self.run_template(firing, template).await {
                Ok((input, outcome)) => recorded.push(Pending {
                    action: template.action.clone(),
                    input,
                    outcome,
                    cause: cause.clone(),
                }),
                Err(error) => {
                    return FiringResult {
                        recorded,
                        error: Some(error),
                    }
                }
            }
        }

        FiringResult {
            recorded,
            error: None,
        }
    }

    async fn run_template(
        &self,
        firing: &Firing<'_>,
        template: &ThenTemplate,
    ) -> Result<(Record, Outcome)> {
        let input = template.substitute(firing.sync.id(), &firing.frame)?;
        let outcome = self.invoke(&template.action, input.clone()).await?;
        tracing::trace!(
            sync = %firing.sync.id(),
            action = %template.action,
            kind = %outcome.kind,
            "template invoked"
        );
        Ok((input, outcome))
    }

    /// Fire a batch with at most `limit` firings in flight.
    ///
    /// Results come back in the order of `firings` and every firing runs to
    /// completion, even when another one fails.
    pub async fn dispatch_all(&self, firings: &[Firing<'_>], limit: usize) -> Vec<FiringResult> {
        let pending: Vec<_> = firings.iter().map(|firing| self.fire(firing)).collect();
        stream::iter(pending)
            .buffered(limit.max(1))
            .collect()
            .await
    }
}
