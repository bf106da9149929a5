//! Pattern and template terms: literals and variable references
//!
//! In sync tables a term is written as a plain value. Strings of the form
//! `"?name"` or `"?name.field.sub"` are variable references; `{ lit: ... }`
//! forces a literal (useful for strings that start with `?`); everything
//! else is a literal.

use crate::frame::Frame;
use bodymap_types::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

const VAR_SIGIL: char = '?';
const LITERAL_ESCAPE: &str = "lit";

/// A variable reference with an optional field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarRef {
    pub name: String,
    pub path: Vec<String>,
}

impl VarRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: Vec::new(),
        }
    }

    /// Parse `name.field.sub` (without the leading sigil).
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split('.');
        let name = parts.next().filter(|n| !n.is_empty())?;
        let path: Vec<String> = parts.map(str::to_string).collect();
        if path.iter().any(String::is_empty) {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            path,
        })
    }

    pub fn has_path(&self) -> bool {
        !self.path.is_empty()
    }

    /// Look the variable up in a frame and follow the field path.
    ///
    /// Array elements can be addressed by index. Returns `None` when the
    /// variable is unbound or the path leads nowhere.
    pub fn resolve(&self, frame: &Frame) -> Option<Value> {
        let mut current = frame.get(&self.name)?;
        for segment in &self.path {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current.clone())
    }
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", VAR_SIGIL, self.name)?;
        for segment in &self.path {
            write!(f, ".{}", segment)?;
        }
        Ok(())
    }
}

/// A literal value or a variable reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Term {
    Var(VarRef),
    Literal(Value),
}

impl Term {
    /// A bare variable, `?name`
    pub fn var(name: impl Into<String>) -> Self {
        Term::Var(VarRef::new(name))
    }

    /// A variable reference with a field path, e.g. `Term::path("state", ["user"])`.
    pub fn path<I, S>(name: impl Into<String>, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Term::Var(VarRef {
            name: name.into(),
            path: path.into_iter().map(Into::into).collect(),
        })
    }

    /// A literal value
    pub fn lit(value: impl Into<Value>) -> Self {
        Term::Literal(value.into())
    }

    pub fn as_var(&self) -> Option<&VarRef> {
        match self {
            Term::Var(var) => Some(var),
            Term::Literal(_) => None,
        }
    }

    /// Substitute from a frame. Literals resolve to themselves.
    pub fn resolve(&self, frame: &Frame) -> Option<Value> {
        match self {
            Term::Var(var) => var.resolve(frame),
            Term::Literal(value) => Some(value.clone()),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Var(var) => write!(f, "{}", var),
            Term::Literal(value) => write!(f, "{}", value),
        }
    }
}

impl TryFrom<Value> for Term {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(text) if text.starts_with(VAR_SIGIL) => VarRef::parse(&text[1..])
                .map(Term::Var)
                .ok_or_else(|| format!("invalid variable reference `{}`", text)),
            Value::Object(mut map) if map.len() == 1 && map.contains_key(LITERAL_ESCAPE) => {
                Ok(Term::Literal(map.remove(LITERAL_ESCAPE).unwrap_or(Value::Null)))
            }
            other => Ok(Term::Literal(other)),
        }
    }
}

impl From<Term> for Value {
    fn from(term: Term) -> Self {
        match term {
            Term::Var(var) => Value::String(var.to_string()),
            Term::Literal(value) => {
                let needs_escape = match &value {
                    Value::String(text) => text.starts_with(VAR_SIGIL),
                    Value::Object(map) => map.len() == 1 && map.contains_key(LITERAL_ESCAPE),
                    _ => false,
                };
                if needs_escape {
                    let mut map = serde_json::Map::new();
                    map.insert(LITERAL_ESCAPE.to_string(), value);
                    Value::Object(map)
                } else {
                    value
                }
            }
        }
    }
}
