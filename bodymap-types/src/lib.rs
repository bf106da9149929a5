//! Shared types for bodymap
//!
//! This crate provides the value types exchanged between concepts and the
//! synchronization engine: records, action references and sync identifiers.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

pub use serde_json::Value;

/// A flat, field-keyed record passed into and returned from actions.
///
/// Keys are kept sorted so that two records with the same contents always
/// serialize to the same bytes.
pub type Record = BTreeMap<String, Value>;

/// Build a [`Record`] from `(field, value)` pairs.
pub fn record<I, K, V>(pairs: I) -> Record
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Convert a [`Record`] back into a JSON object.
pub fn to_value(record: &Record) -> Value {
    Value::Object(
        record
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    )
}

/// The populated field names of a record.
pub fn field_set(record: &Record) -> BTreeSet<&str> {
    record.keys().map(String::as_str).collect()
}

/// Reference to an action or query: `Concept.action`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActionRef {
    pub concept: String,
    pub action: String,
}

impl ActionRef {
    /// Reference `concept.action`
    pub fn new(concept: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            concept: concept.into(),
            action: action.into(),
        }
    }

    /// Parse `Concept.action`. The concept part may not be empty and the
    /// split happens on the first dot.
    pub fn parse(text: &str) -> Result<Self, ParseActionRefError> {
        match text.split_once('.') {
            Some((concept, action)) if !concept.is_empty() && !action.is_empty() => {
                Ok(Self::new(concept, action))
            }
            _ => Err(ParseActionRefError(text.to_string())),
        }
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.concept, self.action)
    }
}

impl TryFrom<String> for ActionRef {
    type Error = ParseActionRefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ActionRef> for String {
    fn from(value: ActionRef) -> Self {
        value.to_string()
    }
}

/// Error returned when an action reference is not of the form `Concept.action`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected `Concept.action`, got `{0}`")]
pub struct ParseActionRefError(pub String);

/// Synchronization rule identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncId(pub String);

impl SyncId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SyncId {
    fn from(id: &str) -> Self {
        SyncId(id.to_string())
    }
}

impl From<String> for SyncId {
    fn from(id: String) -> Self {
        SyncId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_ref_parse() {
        let r = ActionRef::parse("Requesting.request").unwrap();
        assert_eq!(r.concept, "Requesting");
        assert_eq!(r.action, "request");
        assert_eq!(r.to_string(), "Requesting.request");
        assert_eq!(
            ActionRef::parse("Sessioning._getSession").unwrap().action,
            "_getSession"
        );
        assert!(ActionRef::parse("nodot").is_err());
        assert!(ActionRef::parse(".x").is_err());
        assert!(ActionRef::parse("X.").is_err());
    }

    #[test]
    fn test_action_ref_serde_as_string() {
        let r: ActionRef = serde_json::from_value(json!("UserAuthentication.register")).unwrap();
        assert_eq!(r, ActionRef::new("UserAuthentication", "register"));
        assert_eq!(serde_json::to_value(&r).unwrap(), json!("UserAuthentication.register"));
        assert!(serde_json::from_value::<ActionRef>(json!("broken")).is_err());
    }

    #[test]
    fn test_record_helpers() {
        let rec = record([("user", json!("u1")), ("active", json!(true))]);
        assert_eq!(field_set(&rec).into_iter().collect::<Vec<_>>(), vec!["active", "user"]);
        assert_eq!(to_value(&rec), json!({"user": "u1", "active": true}));
    }
}
