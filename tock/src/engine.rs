//! Tick scheduler
//!
//! An [`Engine`] owns the registry, the compiled sync table and the engine
//! configuration. Every call to [`Engine::invoke`] runs one tick:
//!
//! ```text
//! Seeded -> Evaluating <-> Dispatching -> Fixpoint
//!                  \-> Aborted (iteration bound)
//! ```
//!
//! Each tick allocates its own occurrence log, fired set and record of
//! failed `where` queries, so concurrent ticks share nothing but the concepts
//! behind the registry.

use crate::config::EngineConfig;
use crate::dispatch::{Dispatcher, Firing};
use crate::error::{EngineError, Result};
use crate::frame::{Frame, FrameKey};
use crate::log::{FiredSet, OccurrenceLog};
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::pattern::{match_when, Match};
use crate::registry::ActionRegistry;
use crate::report::TickReport;
use crate::sync::{CompiledSync, SyncRule, SyncTable};
use crate::transform::FrameTransformer;
use crate::types::{TickId, TickPhase};
use bodymap_types::{ActionRef, Record};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::Instrument;

/// (sync index, `when`-frame key) pairs whose `where` query failed this tick
type FailedWheres = HashSet<(usize, FrameKey)>;

/// Per-tick state. Dropped when the tick ends.
struct TickState {
    tick: TickId,
    phase: TickPhase,
    log: OccurrenceLog,
    fired: FiredSet,
    failed: FailedWheres,
    rounds: usize,
    firings: usize,
}

impl TickState {
    fn new(tick: TickId) -> Self {
        Self {
            tick,
            phase: TickPhase::Seeded,
            log: OccurrenceLog::new(),
            fired: FiredSet::new(),
            failed: FailedWheres::new(),
            rounds: 0,
            firings: 0,
        }
    }

    fn enter(&mut self, phase: TickPhase) {
        tracing::trace!(from = %self.phase, to = %phase, round = self.rounds, "phase");
        self.phase = phase;
    }
}

struct EngineInner {
    registry: Arc<ActionRegistry>,
    syncs: Vec<CompiledSync>,
    config: EngineConfig,
    metrics: EngineMetrics,
}

/// The synchronization engine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Validate `config`, then `table` against `registry`, and build an engine.
    pub fn new(
        registry: impl Into<Arc<ActionRegistry>>,
        table: &SyncTable,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let registry = registry.into();
        let syncs = table.compile(&registry)?;
        tracing::info!(
            syncs = syncs.len(),
            actions = registry.actions().len(),
            queries = registry.queries().len(),
            "engine ready"
        );
        Ok(Self {
            inner: Arc::new(EngineInner {
                registry,
                syncs,
                config,
                metrics: EngineMetrics::new(),
            }),
        })
    }

    /// The registry syncs were validated against
    pub fn registry(&self) -> &ActionRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// The loaded syncs, in evaluation order
    pub fn syncs(&self) -> impl Iterator<Item = &SyncRule> {
        self.inner.syncs.iter().map(|sync| &sync.rule)
    }

    /// Counters accumulated across every tick run so far
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Seed a tick with one external invocation and run it to fixpoint.
    ///
    /// The tick runs on its own task: dropping the returned future does not
    /// stop it, since the side effects of dispatched actions cannot be undone.
    pub async fn invoke(&self, action: &ActionRef, input: Record) -> Result<TickReport> {
        let tick = TickId::new();
        let engine = self.clone();
        let trigger = action.clone();
        let handle = tokio::spawn(async move { engine.run_tick(tick, trigger, input).await });

        match handle.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Err(EngineError::TickInterrupted { tick }),
        }
    }

    async fn run_tick(&self, tick: TickId, trigger: ActionRef, input: Record) -> Result<TickReport> {
        let span = tracing::info_span!("tick", tick = %tick, trigger = %trigger);
        async move {
            let metrics = &self.inner.metrics;
            metrics.record_tick_started();

            let result = self.drive(tick, trigger, input).await;
            match &result {
                Ok(report) => {
                    metrics.record_tick_completed();
                    tracing::debug!(
                        occurrences = report.len(),
                        rounds = report.rounds,
                        firings = report.firings,
                        "fixpoint reached"
                    );
                }
                Err(err @ EngineError::CycleBoundExceeded { .. }) => {
                    metrics.record_tick_aborted();
                    tracing::error!(error = %err, "tick aborted");
                }
                Err(err) => {
                    metrics.record_tick_failed();
                    tracing::error!(error = %err, "tick failed");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, tick: TickId, trigger: ActionRef, input: Record) -> Result<TickReport> {
        let started_at = Utc::now();
        let config = &self.inner.config;
        let dispatcher = Dispatcher::new(&self.inner.registry, &self.inner.metrics);
        let mut state = TickState::new(tick);

        let outcome = dispatcher.invoke(&trigger, input.clone()).await?;
        state.log.append(trigger.clone(), input, outcome, None);

        loop {
            state.enter(TickPhase::Evaluating);
            let firings = self.evaluate(&mut state).await?;
            if firings.is_empty() {
                state.enter(TickPhase::Fixpoint);
                break;
            }

            if state.rounds >= config.max_iterations {
                state.enter(TickPhase::Aborted);
                return Err(EngineError::CycleBoundExceeded {
                    tick: state.tick,
                    iterations: state.rounds,
                });
            }

            state.enter(TickPhase::Dispatching);
            state.rounds += 1;
            for firing in &firings {
                tracing::debug!(
                    sync = %firing.sync.id(),
                    frame = %firing.key,
                    round = state.rounds,
                    "firing"
                );
                state.fired.insert(firing.sync.id().clone(), firing.key);
                self.inner.metrics.record_firing();
            }
            state.firings += firings.len();

            let results = dispatcher
                .dispatch_all(&firings, config.dispatch_limit())
                .await;

            // completed invocations are logged even when a sibling failed
            let mut first_error = None;
            for result in results {
                for pending in result.recorded {
                    state
                        .log
                        .append(pending.action, pending.input, pending.outcome, Some(pending.cause));
                }
                if first_error.is_none() {
                    first_error = result.error;
                }
            }
            if let Some(err) = first_error {
                return Err(err);
            }
        }

        Ok(TickReport {
            tick,
            trigger,
            occurrences: state.log.into_vec(),
            rounds: state.rounds,
            firings: state.firings,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// One evaluating pass: every sync against the whole current log.
    async fn evaluate(&self, state: &mut TickState) -> Result<Vec<Firing<'_>>> {
        let mut firings = Vec::new();
        let mut seen: HashSet<(usize, FrameKey)> = HashSet::new();

        for (index, sync) in self.inner.syncs.iter().enumerate() {
            let matches = match_when(&sync.when, &state.log);
            if matches.is_empty() {
                continue;
            }

            let candidates = if sync.has_where() {
                self.transform(index, sync, matches, &mut state.failed).await?
            } else {
                matches
                    .into_iter()
                    .map(|m| {
                        let frames = vec![m.frame.clone()];
                        (m, frames)
                    })
                    .collect()
            };

            for (matched, frames) in candidates {
                for frame in frames {
                    let key = frame.key();
                    if state.fired.contains(sync.id(), &key) || !seen.insert((index, key)) {
                        continue;
                    }
                    firings.push(Firing {
                        sync,
                        frame,
                        key,
                        matched: matched.matched.clone(),
                    });
                }
            }
        }

        Ok(firings)
    }

    /// Run a sync's `where` steps over its current `when` frames.
    ///
    /// Steps re-run on every pass so queries see the effects of earlier
    /// rounds. A failing query drops every frame of the batch for the rest of
    /// the tick; other errors abort the tick.
    async fn transform(
        &self,
        index: usize,
        sync: &CompiledSync,
        matches: Vec<Match>,
        failed: &mut FailedWheres,
    ) -> Result<Vec<(Match, Vec<Frame>)>> {
        let keys: Vec<FrameKey> = matches.iter().map(|m| m.frame.key()).collect();

        let mut fresh = Vec::new();
        let mut fresh_keys = Vec::new();
        for (m, key) in matches.iter().zip(&keys) {
            if !failed.contains(&(index, *key)) && !fresh_keys.contains(key) {
                fresh.push(m.frame.clone());
                fresh_keys.push(*key);
            }
        }

        let mut results: HashMap<FrameKey, Vec<Frame>> = HashMap::new();
        if !fresh.is_empty() {
            let transformer = FrameTransformer::new(&self.inner.registry, &self.inner.metrics);
            match transformer
                .apply(sync.id(), &sync.rule.where_steps, fresh)
                .await
            {
                Ok(frames) => results.extend(fresh_keys.into_iter().zip(frames)),
                Err(EngineError::QueryFailed { query, source }) => {
                    self.inner.metrics.record_query_failure();
                    tracing::warn!(
                        sync = %sync.id(),
                        query = %query,
                        error = %source,
                        frames = fresh_keys.len(),
                        "where query failed, dropping frames for this tick"
                    );
                    failed.extend(fresh_keys.into_iter().map(|key| (index, key)));
                }
                Err(err) => return Err(err),
            }
        }

        Ok(matches
            .into_iter()
            .zip(keys)
            .map(|(m, key)| {
                let frames = results.get(&key).cloned().unwrap_or_default();
                (m, frames)
            })
            .collect())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("syncs", &self.inner.syncs.len())
            .field("config", &self.inner.config)
            .finish()
    }
}
