//! Variable bindings produced by matching

use bodymap_types::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A mapping from variable name to bound value.
///
/// Bindings are kept sorted by name, which makes [`Frame::key`] independent
/// of the order in which variables were bound.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frame(BTreeMap<String, Value>);

impl Frame {
    /// An empty frame
    pub fn new() -> Self {
        Self::default()
    }

    /// The value bound to `name`, if any
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Whether `name` is bound
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Bindings in name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Bound variable names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Bind `name` to `value`, or check consistency if already bound.
    ///
    /// Returns false when the variable is bound to a different value.
    pub fn bind(&mut self, name: &str, value: &Value) -> bool {
        match self.0.get(name) {
            Some(existing) => existing == value,
            None => {
                self.0.insert(name.to_string(), value.clone());
                true
            }
        }
    }

    /// Bind unconditionally, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    /// Builder-style [`Frame::set`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value.into());
        self
    }

    /// Stable content hash of the bindings.
    pub fn key(&self) -> FrameKey {
        let mut hasher = blake3::Hasher::new();
        for (name, value) in &self.0 {
            hasher.update(name.as_bytes());
            hasher.update(&[0]);
            hasher.update(value.to_string().as_bytes());
            hasher.update(&[0]);
        }
        FrameKey(*hasher.finalize().as_bytes())
    }
}

impl FromIterator<(String, Value)> for Frame {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Content hash of a [`Frame`]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameKey(pub [u8; 32]);

impl fmt::Debug for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameKey({})", self)
    }
}

impl fmt::Display for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..6] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
