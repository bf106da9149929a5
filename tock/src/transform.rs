//! `where`-clause execution
//!
//! The transformer runs a sync's step list over a batch of `when` frames.
//! Query steps are batched: each distinct input record is queried once per
//! step, however many frames share it.

use crate::error::{EngineError, Result};
use crate::frame::Frame;
use crate::metrics::EngineMetrics;
use crate::registry::ActionRegistry;
use crate::sync::{substitute, Predicate, WhereStep};
use crate::term::Term;
use bodymap_types::{to_value, ActionRef, Record, SyncId, Value};
use futures::future::try_join_all;
use std::collections::{BTreeMap, HashMap};

pub struct FrameTransformer<'a> {
    registry: &'a ActionRegistry,
    metrics: &'a EngineMetrics,
}

impl<'a> FrameTransformer<'a> {
    pub fn new(registry: &'a ActionRegistry, metrics: &'a EngineMetrics) -> Self {
        Self { registry, metrics }
    }

    /// Run `steps` over `frames`.
    ///
    /// The result has one entry per input frame, holding the frames derived
    /// from it (possibly none). Any error fails the whole batch.
    pub async fn apply(
        &self,
        sync: &SyncId,
        steps: &[WhereStep],
        frames: Vec<Frame>,
    ) -> Result<Vec<Vec<Frame>>> {
        let origins = frames.len();
        let mut rows: Vec<(usize, Frame)> = frames.into_iter().enumerate().collect();

        for step in steps {
            if rows.is_empty() {
                break;
            }
            rows = match step {
                WhereStep::Query { query, input, bind } => {
                    self.join_query(sync, query, input, bind, rows).await?
                }
                WhereStep::Filter { predicate } => {
                    let mut kept = Vec::with_capacity(rows.len());
                    for (origin, frame) in rows {
                        if evaluate(predicate, &frame, self.registry)? {
                            kept.push((origin, frame));
                        }
                    }
                    kept
                }
                WhereStep::Project { from, into } => rows
                    .into_iter()
                    .filter_map(|(origin, mut frame)| {
                        let value = from.resolve(&frame)?;
                        frame.set(into.clone(), value);
                        Some((origin, frame))
                    })
                    .collect(),
            };
        }

        let mut grouped = vec![Vec::new(); origins];
        for (origin, frame) in rows {
            grouped[origin].push(frame);
        }
        Ok(grouped)
    }

    async fn join_query(
        &self,
        sync: &SyncId,
        query: &ActionRef,
        input: &BTreeMap<String, Term>,
        bind: &str,
        rows: Vec<(usize, Frame)>,
    ) -> Result<Vec<(usize, Frame)>> {
        let mut distinct: Vec<Record> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut slots = Vec::with_capacity(rows.len());

        for (_, frame) in &rows {
            let record = substitute(input, sync, frame)?;
            let key = to_value(&record).to_string();
            let slot = *index.entry(key).or_insert_with(|| {
                distinct.push(record);
                distinct.len() - 1
            });
            slots.push(slot);
        }

        tracing::trace!(
            sync = %sync,
            query = %query,
            frames = rows.len(),
            calls = distinct.len(),
            "running where query"
        );

        let results = try_join_all(distinct.into_iter().map(|input| {
            self.metrics.record_query();
            self.registry.query(query, input)
        }))
        .await?;

        let mut joined = Vec::new();
        for ((origin, frame), slot) in rows.into_iter().zip(slots) {
            for row in &results[slot] {
                let mut next = frame.clone();
                next.set(bind, to_value(row));
                joined.push((origin, next));
            }
        }
        Ok(joined)
    }
}

/// Evaluate a predicate against a frame.
///
/// In `eq`/`ne` a term that does not resolve compares as `null`.
pub fn evaluate(predicate: &Predicate, frame: &Frame, registry: &ActionRegistry) -> Result<bool> {
    let value_of = |term: &Term| term.resolve(frame).unwrap_or(Value::Null);

    Ok(match predicate {
        Predicate::Eq([a, b]) => value_of(a) == value_of(b),
        Predicate::Ne([a, b]) => value_of(a) != value_of(b),
        Predicate::Present(term) => !value_of(term).is_null(),
        Predicate::Truthy(term) => is_truthy(&value_of(term)),
        Predicate::Not(inner) => !evaluate(inner, frame, registry)?,
        Predicate::All(items) => {
            for item in items {
                if !evaluate(item, frame, registry)? {
                    return Ok(false);
                }
            }
            true
        }
        Predicate::Any(items) => {
            for item in items {
                if evaluate(item, frame, registry)? {
                    return Ok(true);
                }
            }
            false
        }
        Predicate::Custom(name) => {
            let f = registry
                .predicate(name)
                .ok_or_else(|| EngineError::UnknownPredicate(name.clone()))?;
            f(frame)
        }
    })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
