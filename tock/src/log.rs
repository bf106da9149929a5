//! Tick-scoped occurrence log and fired set
//!
//! Both structures are allocated fresh for every tick and dropped (or handed
//! to the caller inside a report) when the tick ends.

use crate::frame::FrameKey;
use crate::outcome::Outcome;
use crate::types::Seq;
use bodymap_types::{ActionRef, Record, SyncId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Why an occurrence happened: the sync and frame that fired it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cause {
    pub sync: SyncId,
    pub frame: FrameKey,
    /// Occurrences the `when` clause matched to produce the frame
    pub matched: Vec<Seq>,
}

/// One recorded action invocation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    pub seq: Seq,
    pub action: ActionRef,
    pub input: Record,
    pub outcome: Outcome,
    /// `None` for the occurrence that seeded the tick
    pub cause: Option<Cause>,
    pub recorded_at: DateTime<Utc>,
}

impl Occurrence {
    /// The record the action returned
    pub fn output(&self) -> &Record {
        self.outcome.record()
    }

    /// True for the occurrence that seeded the tick
    pub fn is_root(&self) -> bool {
        self.cause.is_none()
    }
}

/// Append-only, arena-indexed list of occurrences.
///
/// An occurrence's [`Seq`] is its index in the arena. A per-action index
/// keeps pattern scans proportional to the occurrences of one action.
#[derive(Debug, Clone, Default)]
pub struct OccurrenceLog {
    entries: Vec<Occurrence>,
    by_action: HashMap<ActionRef, Vec<usize>>,
}

impl OccurrenceLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an occurrence and return its sequence number.
    pub fn append(
        &mut self,
        action: ActionRef,
        input: Record,
        outcome: Outcome,
        cause: Option<Cause>,
    ) -> Seq {
        let index = self.entries.len();
        let seq = Seq(index as u64);
        self.by_action.entry(action.clone()).or_default().push(index);
        self.entries.push(Occurrence {
            seq,
            action,
            input,
            outcome,
            cause,
            recorded_at: Utc::now(),
        });
        seq
    }

    /// Look up an occurrence by sequence number.
    pub fn get(&self, seq: Seq) -> Option<&Occurrence> {
        self.entries.get(seq.index())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All occurrences in append order
    pub fn iter(&self) -> impl Iterator<Item = &Occurrence> {
        self.entries.iter()
    }

    /// Occurrences of one action, in append order
    pub fn of_action<'a>(&'a self, action: &ActionRef) -> impl Iterator<Item = &'a Occurrence> + 'a {
        self.by_action
            .get(action)
            .map(|indices| indices.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |&i| &self.entries[i])
    }

    /// The seeding occurrence
    pub fn root(&self) -> Option<&Occurrence> {
        self.entries.first()
    }

    /// Consume the log, keeping append order.
    pub fn into_vec(self) -> Vec<Occurrence> {
        self.entries
    }
}

/// Set of (sync, frame) pairs already dispatched in this tick.
#[derive(Debug, Clone, Default)]
pub struct FiredSet {
    fired: HashSet<(SyncId, FrameKey)>,
}

impl FiredSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this (sync, frame) pair already fired
    pub fn contains(&self, sync: &SyncId, frame: &FrameKey) -> bool {
        self.fired.contains(&(sync.clone(), *frame))
    }

    /// Mark a pair as fired. Returns false if it was already present.
    pub fn insert(&mut self, sync: SyncId, frame: FrameKey) -> bool {
        self.fired.insert((sync, frame))
    }

    pub fn len(&self) -> usize {
        self.fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::outcome::OutcomeKind;
    use bodymap_types::record;
    use serde_json::json;

    fn ok(record: Record) -> Outcome {
        Outcome {
            kind: OutcomeKind::Success,
            variant: None,
            record,
        }
    }

    #[test]
    fn test_append_assigns_monotonic_seq() {
        let mut log = OccurrenceLog::new();
        let req = ActionRef::new("Requesting", "request");
        let reg = ActionRef::new("UserAuthentication", "register");

        let s0 = log.append(req.clone(), Record::new(), ok(record([("request", json!("r1"))])), None);
        let s1 = log.append(
            reg.clone(),
            Record::new(),
            ok(record([("user", json!("u1"))])),
            Some(Cause {
                sync: SyncId::new("Register"),
                frame: Frame::new().key(),
                matched: vec![s0],
            }),
        );

        assert_eq!(s0, Seq(0));
        assert_eq!(s1, Seq(1));
        assert_eq!(log.len(), 2);
        assert!(log.root().unwrap().is_root());
        assert_eq!(log.of_action(&reg).count(), 1);
        assert_eq!(log.of_action(&ActionRef::new("X", "y")).count(), 0);
        assert_eq!(log.get(s1).unwrap().cause.as_ref().unwrap().matched, vec![s0]);
        assert_eq!(log.get(s1).unwrap().output()["user"], json!("u1"));
    }

    #[test]
    fn test_fired_set_rejects_duplicates() {
        let mut fired = FiredSet::new();
        let sync = SyncId::new("Respond");
        let key = Frame::new().with("request", "r1").key();

        assert!(fired.insert(sync.clone(), key));
        assert!(!fired.insert(sync.clone(), key));
        assert!(fired.contains(&sync, &key));
        assert!(!fired.contains(&SyncId::new("Other"), &key));
        assert_eq!(fired.len(), 1);
    }
}
