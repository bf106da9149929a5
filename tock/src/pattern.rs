//! `when`-clause matching
//!
//! A `when` clause is an ordered list of [`ActionPattern`]s. Matching is a
//! left-to-right relational join over the occurrence log: each pattern
//! extends every partial frame with every compatible occurrence, and frames
//! that fail a literal or a variable consistency check are dropped.

use crate::frame::Frame;
use crate::log::{Occurrence, OccurrenceLog};
use crate::outcome::OutcomeKind;
use crate::term::Term;
use crate::types::Seq;
use bodymap_types::{ActionRef, Record};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Pattern over one action occurrence.
///
/// Fields absent from `input` or `output` impose no constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPattern {
    pub action: ActionRef,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub input: BTreeMap<String, Term>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub output: BTreeMap<String, Term>,
}

impl ActionPattern {
    /// A pattern matching any occurrence of `action`
    pub fn new(action: ActionRef) -> Self {
        Self {
            action,
            input: BTreeMap::new(),
            output: BTreeMap::new(),
        }
    }

    /// Constrain an input field.
    pub fn input(mut self, field: impl Into<String>, term: Term) -> Self {
        self.input.insert(field.into(), term);
        self
    }

    /// Constrain an output field. Output fields also select the variant.
    pub fn output(mut self, field: impl Into<String>, term: Term) -> Self {
        self.output.insert(field.into(), term);
        self
    }

    /// Names of all variables this pattern binds
    pub fn variables(&self) -> BTreeSet<&str> {
        self.input
            .values()
            .chain(self.output.values())
            .filter_map(|term| term.as_var().map(|v| v.name.as_str()))
            .collect()
    }

    /// Extend `frame` with the bindings `occurrence` provides, if compatible.
    pub fn extend(&self, frame: &Frame, occurrence: &Occurrence) -> Option<Frame> {
        let mut next = frame.clone();
        if bind_fields(&mut next, &self.input, &occurrence.input)
            && bind_fields(&mut next, &self.output, occurrence.output())
        {
            Some(next)
        } else {
            None
        }
    }
}

fn bind_fields(frame: &mut Frame, pattern: &BTreeMap<String, Term>, record: &Record) -> bool {
    pattern.iter().all(|(field, term)| {
        let Some(value) = record.get(field) else {
            return false;
        };
        match term {
            Term::Literal(literal) => literal == value,
            Term::Var(var) => frame.bind(&var.name, value),
        }
    })
}

/// A `when` pattern together with the outcome kind its output pattern implies.
#[derive(Debug, Clone, PartialEq)]
pub struct WhenPattern {
    pub pattern: ActionPattern,
    /// `None` matches either kind
    pub expects: Option<OutcomeKind>,
}

impl WhenPattern {
    fn accepts(&self, occurrence: &Occurrence) -> bool {
        self.expects
            .map_or(true, |kind| occurrence.outcome.kind == kind)
    }
}

/// A frame produced by the join, with the occurrences that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub frame: Frame,
    pub matched: Vec<Seq>,
}

/// Join `patterns` over `log`, returning every total frame.
///
/// Cost is O(k · |log| · |frames|); logs are tick-scoped and small.
pub fn match_when(patterns: &[WhenPattern], log: &OccurrenceLog) -> Vec<Match> {
    let mut partial = vec![Match {
        frame: Frame::new(),
        matched: Vec::new(),
    }];

    for when in patterns {
        let mut next = Vec::new();
        for occurrence in log.of_action(&when.pattern.action) {
            if !when.accepts(occurrence) {
                continue;
            }
            for current in &partial {
                if let Some(frame) = when.pattern.extend(&current.frame, occurrence) {
                    let mut matched = current.matched.clone();
                    matched.push(occurrence.seq);
                    next.push(Match { frame, matched });
                }
            }
        }
        if next.is_empty() {
            return Vec::new();
        }
        partial = next;
    }

    // every pattern field must be present for a pattern to match, so each
    // surviving frame binds all `when` variables
    partial
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Outcome;
    use bodymap_types::record;
    use serde_json::json;

    fn outcome(kind: OutcomeKind, record: Record) -> Outcome {
        Outcome {
            kind,
            variant: None,
            record,
        }
    }

    fn a() -> ActionRef {
        ActionRef::new("A", "act")
    }

    fn b() -> ActionRef {
        ActionRef::new("B", "act")
    }

    fn when(pattern: ActionPattern) -> WhenPattern {
        WhenPattern {
            pattern,
            expects: None,
        }
    }

    fn join_clause() -> Vec<WhenPattern> {
        vec![
            when(
                ActionPattern::new(a())
                    .input("session", Term::var("session"))
                    .output("request", Term::var("request")),
            ),
            when(
                ActionPattern::new(b())
                    .input("session", Term::var("session"))
                    .output("user", Term::var("user")),
            ),
        ]
    }

    #[test]
    fn test_join_on_shared_variable() {
        let mut log = OccurrenceLog::new();
        log.append(
            a(),
            record([("session", json!(5))]),
            outcome(OutcomeKind::Success, record([("request", json!(1))])),
            None,
        );
        log.append(
            b(),
            record([("session", json!(5))]),
            outcome(OutcomeKind::Success, record([("user", json!(9))])),
            None,
        );

        let matches = match_when(&join_clause(), &log);
        assert_eq!(matches.len(), 1);
        let expected = Frame::new()
            .with("session", 5)
            .with("request", 1)
            .with("user", 9);
        assert_eq!(matches[0].frame, expected);
        assert_eq!(matches[0].matched, vec![Seq(0), Seq(1)]);
    }

    #[test]
    fn test_join_rejects_inconsistent_binding() {
        let mut log = OccurrenceLog::new();
        log.append(
            a(),
            record([("session", json!(5))]),
            outcome(OutcomeKind::Success, record([("request", json!(1))])),
            None,
        );
        log.append(
            b(),
            record([("session", json!(6))]),
            outcome(OutcomeKind::Success, record([("user", json!(9))])),
            None,
        );

        assert!(match_when(&join_clause(), &log).is_empty());
    }

    #[test]
    fn test_literal_and_dont_care_fields() {
        let mut log = OccurrenceLog::new();
        log.append(
            a(),
            record([("path", json!("/auth/register")), ("noise", json!(true))]),
            outcome(OutcomeKind::Success, record([("request", json!("r1"))])),
            None,
        );
        log.append(
            a(),
            record([("path", json!("/auth/login"))]),
            outcome(OutcomeKind::Success, record([("request", json!("r2"))])),
            None,
        );

        let clause = vec![when(
            ActionPattern::new(a())
                .input("path", Term::lit("/auth/register"))
                .output("request", Term::var("request")),
        )];
        let matches = match_when(&clause, &log);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].frame.get("request"), Some(&json!("r1")));
    }

    #[test]
    fn test_variant_discrimination() {
        let mut log = OccurrenceLog::new();
        log.append(
            b(),
            Record::new(),
            outcome(OutcomeKind::Failure, record([("error", json!("x"))])),
            None,
        );

        let success = vec![WhenPattern {
            pattern: ActionPattern::new(b()).output("mapId", Term::var("map")),
            expects: Some(OutcomeKind::Success),
        }];
        let failure = vec![WhenPattern {
            pattern: ActionPattern::new(b()).output("error", Term::var("error")),
            expects: Some(OutcomeKind::Failure),
        }];
        assert!(match_when(&success, &log).is_empty());
        assert_eq!(match_when(&failure, &log).len(), 1);

        let mut log = OccurrenceLog::new();
        log.append(
            b(),
            Record::new(),
            outcome(OutcomeKind::Success, record([("mapId", json!("m1"))])),
            None,
        );
        assert_eq!(match_when(&success, &log).len(), 1);
        assert!(match_when(&failure, &log).is_empty());
    }

    #[test]
    fn test_kind_checked_even_when_fields_overlap() {
        let mut log = OccurrenceLog::new();
        log.append(
            b(),
            Record::new(),
            outcome(
                OutcomeKind::Failure,
                record([("request", json!("r1")), ("error", json!("bad"))]),
            ),
            None,
        );
        let success_only = vec![WhenPattern {
            pattern: ActionPattern::new(b()).output("request", Term::var("request")),
            expects: Some(OutcomeKind::Success),
        }];
        assert!(match_when(&success_only, &log).is_empty());
    }

    #[test]
    fn test_cross_product_of_independent_patterns() {
        let mut log = OccurrenceLog::new();
        for i in 0..3 {
            log.append(
                a(),
                Record::new(),
                outcome(OutcomeKind::Success, record([("x", json!(i))])),
                None,
            );
        }
        for i in 0..2 {
            log.append(
                b(),
                Record::new(),
                outcome(OutcomeKind::Success, record([("y", json!(i))])),
                None,
            );
        }
        let clause = vec![
            when(ActionPattern::new(a()).output("x", Term::var("x"))),
            when(ActionPattern::new(b()).output("y", Term::var("y"))),
        ];
        assert_eq!(match_when(&clause, &log).len(), 6);
    }

    #[test]
    fn test_repeated_variable_within_one_pattern() {
        let mut log = OccurrenceLog::new();
        log.append(
            a(),
            record([("from", json!("u1"))]),
            outcome(OutcomeKind::Success, record([("to", json!("u1"))])),
            None,
        );
        log.append(
            a(),
            record([("from", json!("u1"))]),
            outcome(OutcomeKind::Success, record([("to", json!("u2"))])),
            None,
        );
        let clause = vec![when(
            ActionPattern::new(a())
                .input("from", Term::var("u"))
                .output("to", Term::var("u")),
        )];
        let matches = match_when(&clause, &log);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].matched, vec![Seq(0)]);
    }
}
