//! The result of a completed tick

use crate::log::{Cause, Occurrence};
use crate::types::{Seq, TickId};
use bodymap_types::{to_value, ActionRef, SyncId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Everything a tick recorded, handed to the caller once it reaches fixpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: TickId,
    pub trigger: ActionRef,
    /// The final occurrence log, in append order
    pub occurrences: Vec<Occurrence>,
    /// Dispatching rounds run before the fixpoint
    pub rounds: usize,
    /// (sync, frame) pairs fired
    pub firings: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TickReport {
    /// The occurrence that seeded the tick
    pub fn root(&self) -> Option<&Occurrence> {
        self.occurrences.first()
    }

    pub fn len(&self) -> usize {
        self.occurrences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occurrences.is_empty()
    }

    /// Look up an occurrence by sequence number
    pub fn get(&self, seq: Seq) -> Option<&Occurrence> {
        self.occurrences.get(seq.index())
    }

    /// Every occurrence of `action`, in log order
    pub fn occurrences_of<'a>(
        &'a self,
        action: &'a ActionRef,
    ) -> impl Iterator<Item = &'a Occurrence> + 'a {
        self.occurrences.iter().filter(move |occ| &occ.action == action)
    }

    /// The most recent occurrence of `action`
    pub fn last_of(&self, action: &ActionRef) -> Option<&Occurrence> {
        self.occurrences.iter().rev().find(|occ| &occ.action == action)
    }

    /// Ids of the syncs that fired, in firing order, without repeats
    pub fn fired_syncs(&self) -> Vec<&SyncId> {
        let mut ids: Vec<&SyncId> = Vec::new();
        for cause in self.occurrences.iter().filter_map(|occ| occ.cause.as_ref()) {
            if !ids.contains(&&cause.sync) {
                ids.push(&cause.sync);
            }
        }
        ids
    }

    /// Wall-clock time from seeding to fixpoint
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Render the causal tree: each occurrence, the syncs it triggered, and
    /// the occurrences those syncs produced.
    ///
    /// An occurrence produced by a multi-pattern join is shown under the
    /// latest occurrence its sync matched.
    pub fn render_trace(&self) -> String {
        Trace(self).to_string()
    }
}

struct Trace<'a>(&'a TickReport);

impl Trace<'_> {
    fn children(&self) -> BTreeMap<Seq, Vec<&Occurrence>> {
        let mut children: BTreeMap<Seq, Vec<&Occurrence>> = BTreeMap::new();
        for occ in &self.0.occurrences {
            if let Some(parent) = occ.cause.as_ref().and_then(|c| c.matched.iter().max()) {
                children.entry(*parent).or_default().push(occ);
            }
        }
        children
    }

    fn node(
        &self,
        f: &mut fmt::Formatter<'_>,
        occ: &Occurrence,
        children: &BTreeMap<Seq, Vec<&Occurrence>>,
        depth: usize,
    ) -> fmt::Result {
        let indent = "  ".repeat(depth);
        let kind = match &occ.outcome.variant {
            Some(variant) => format!("{}/{}", occ.outcome.kind, variant),
            None => occ.outcome.kind.to_string(),
        };
        writeln!(
            f,
            "{}{} {} {} -> {} {}",
            indent,
            occ.seq,
            occ.action,
            to_value(&occ.input),
            kind,
            to_value(occ.output())
        )?;

        let Some(produced) = children.get(&occ.seq) else {
            return Ok(());
        };

        // group consecutive occurrences of one firing under its sync
        let mut current: Option<&Cause> = None;
        for child in produced {
            let Some(cause) = child.cause.as_ref() else {
                continue;
            };
            let same_firing = current
                .is_some_and(|c| c.sync == cause.sync && c.frame == cause.frame);
            if !same_firing {
                writeln!(f, "{}  {} [{}]", indent, cause.sync, cause.frame)?;
                current = Some(cause);
            }
            self.node(f, child, children, depth + 2)?;
        }
        Ok(())
    }
}

impl fmt::Display for Trace<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        writeln!(
            f,
            "{} {} ({} occurrences, {} rounds, {} firings)",
            report.tick,
            report.trigger,
            report.len(),
            report.rounds,
            report.firings
        )?;
        let children = self.children();
        for root in report.occurrences.iter().filter(|occ| occ.is_root()) {
            self.node(f, root, &children, 0)?;
        }
        Ok(())
    }
}
