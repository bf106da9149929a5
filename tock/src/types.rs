//! Core identity types for the tock engine
//!
//! These identify ticks and the occurrences recorded within them.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Tick identifier
///
/// Every externally triggered invocation runs as its own tick. Tick ids are
/// globally unique so concurrent ticks can be told apart in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TickId(pub Uuid);

impl TickId {
    /// Create a new unique tick id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TickId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tick:{}", &self.0.to_string()[..8])
    }
}

/// Tick-local sequence number of an occurrence.
///
/// Sequence numbers start at 0 for the seeding occurrence and increase by
/// one per recorded occurrence; they double as indices into the log arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Seq(pub u64);

impl Seq {
    /// Position in the occurrence log
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle phase of a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickPhase {
    Seeded,
    Evaluating,
    Dispatching,
    Fixpoint,
    Aborted,
}

impl fmt::Display for TickPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TickPhase::Seeded => "seeded",
            TickPhase::Evaluating => "evaluating",
            TickPhase::Dispatching => "dispatching",
            TickPhase::Fixpoint => "fixpoint",
            TickPhase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}
