//! Output variants and their tagged representation
//!
//! Concepts return plain records; which variant a record belongs to is only
//! visible from the fields it carries. The engine converts each result into
//! an [`Outcome`] as soon as it arrives so matching works against an explicit
//! tag, and hands the plain record back out through [`Outcome::record`].

use crate::error::{EngineError, Result};
use bodymap_types::{field_set, ActionRef, Record};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The field an undeclared action uses to signal failure.
pub const ERROR_FIELD: &str = "error";

/// Whether an output variant represents success or failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Failure,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeKind::Success => f.write_str("success"),
            OutcomeKind::Failure => f.write_str("failure"),
        }
    }
}

/// A named output shape an action may return
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    pub kind: OutcomeKind,
    pub fields: BTreeSet<String>,
}

impl Variant {
    /// A success variant carrying exactly `fields`
    pub fn success<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            kind: OutcomeKind::Success,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// A failure variant carrying exactly `fields`
    pub fn failure<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            kind: OutcomeKind::Failure,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// The conventional `{error}` failure variant.
    pub fn error() -> Self {
        Self::failure(ERROR_FIELD, [ERROR_FIELD])
    }
}

/// Static description of an action: its reference and declared variants.
///
/// An empty variant list means the action is *open*: records carrying an
/// `error` field are failures and everything else is a success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub action: ActionRef,
    #[serde(default)]
    pub variants: Vec<Variant>,
}

impl ActionDescriptor {
    /// An open descriptor with no declared variants
    pub fn new(action: ActionRef) -> Self {
        Self {
            action,
            variants: Vec::new(),
        }
    }

    /// Declare another output variant.
    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variants.push(variant);
        self
    }

    /// True when no variants are declared
    pub fn is_open(&self) -> bool {
        self.variants.is_empty()
    }

    /// Classify a returned record into a tagged outcome.
    ///
    /// An exact field-set match wins; otherwise the declared variant with the
    /// largest field set contained in the record is chosen. When the largest
    /// candidates disagree on success versus failure the record is ambiguous
    /// and classified as [`EngineError::UnrecognizedVariant`]. Among candidates
    /// of one kind the first declared wins.
    pub fn classify(&self, record: Record) -> Result<Outcome> {
        if self.is_open() {
            let kind = if record.contains_key(ERROR_FIELD) {
                OutcomeKind::Failure
            } else {
                OutcomeKind::Success
            };
            return Ok(Outcome {
                kind,
                variant: None,
                record,
            });
        }

        let keys = field_set(&record);
        let contained = |v: &&Variant| v.fields.iter().all(|f| keys.contains(f.as_str()));

        let chosen = match self
            .variants
            .iter()
            .filter(contained)
            .find(|v| v.fields.len() == keys.len())
        {
            Some(exact) => Some(exact),
            None => {
                let largest = self
                    .variants
                    .iter()
                    .filter(contained)
                    .map(|v| v.fields.len())
                    .max();
                let mut top = self
                    .variants
                    .iter()
                    .filter(contained)
                    .filter(|v| Some(v.fields.len()) == largest);
                let first = top.next();
                match first {
                    Some(first) if top.all(|v| v.kind == first.kind) => Some(first),
                    _ => None,
                }
            }
        };

        match chosen {
            Some(variant) => Ok(Outcome {
                kind: variant.kind,
                variant: Some(variant.name.clone()),
                record,
            }),
            None => Err(EngineError::UnrecognizedVariant {
                action: self.action.clone(),
                fields: record.keys().cloned().collect(),
            }),
        }
    }

    /// The outcome kind implied by an output pattern mentioning `fields`.
    ///
    /// Returns `Ok(None)` when the pattern does not discriminate (no fields,
    /// or fields shared by success and failure variants) and an error when no
    /// declared variant carries all of the fields.
    pub fn implied_kind<'a, I>(&self, fields: I) -> std::result::Result<Option<OutcomeKind>, String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let fields: BTreeSet<&str> = fields.into_iter().collect();
        if fields.is_empty() {
            return Ok(None);
        }

        if self.is_open() {
            return Ok(Some(if fields.contains(ERROR_FIELD) {
                OutcomeKind::Failure
            } else {
                OutcomeKind::Success
            }));
        }

        let kinds: BTreeSet<OutcomeKind> = self
            .variants
            .iter()
            .filter(|v| fields.iter().all(|f| v.fields.contains(*f)))
            .map(|v| v.kind)
            .collect();

        let mut iter = kinds.into_iter();
        match (iter.next(), iter.next()) {
            (None, _) => Err(format!(
                "{} declares no variant with fields {:?}",
                self.action, fields
            )),
            (Some(kind), None) => Ok(Some(kind)),
            (Some(_), Some(_)) => Ok(None),
        }
    }
}

/// An action result tagged with its variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub kind: OutcomeKind,
    /// Name of the declared variant, `None` for open descriptors
    pub variant: Option<String>,
    pub record: Record,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }

    pub fn is_failure(&self) -> bool {
        self.kind == OutcomeKind::Failure
    }

    /// The plain record, as the concept returned it.
    pub fn record(&self) -> &Record {
        &self.record
    }
}
