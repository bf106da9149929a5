//! Sync definitions, the sync table, and static validation
//!
//! A [`SyncRule`] is the declarative when/where/then rule as written in a
//! sync table or built with [`SyncBuilder`]. Before an engine runs a rule it
//! is checked against the registry and turned into a [`CompiledSync`], which
//! carries the outcome kind each `when` pattern implies.

use crate::config::ConfigError;
use crate::error::{EngineError, Result};
use crate::frame::Frame;
use crate::pattern::{ActionPattern, WhenPattern};
use crate::registry::ActionRegistry;
use crate::term::{Term, VarRef};
use bodymap_types::{ActionRef, Record, SyncId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

/// A declarative synchronization rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRule {
    pub id: SyncId,
    pub when: Vec<ActionPattern>,
    #[serde(default, rename = "where", skip_serializing_if = "Vec::is_empty")]
    pub where_steps: Vec<WhereStep>,
    pub then: Vec<ThenTemplate>,
}

/// One step of a `where` clause. Steps run in declared order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum WhereStep {
    /// Run a read-only query and bind each returned row under `bind`.
    ///
    /// A frame is replaced by one frame per row; zero rows drop it.
    Query {
        query: ActionRef,
        #[serde(default)]
        input: BTreeMap<String, Term>,
        bind: String,
    },
    /// Keep only frames satisfying the predicate
    Filter { predicate: Predicate },
    /// Bind the value `from` resolves to under a new variable `into`.
    ///
    /// Frames where `from` does not resolve are dropped.
    Project { from: Term, into: String },
}

/// Boolean condition over a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Eq([Term; 2]),
    Ne([Term; 2]),
    /// The term resolves to a non-null value
    Present(Term),
    /// The term resolves to something other than null, false, 0, "" or an empty collection
    Truthy(Term),
    Not(Box<Predicate>),
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    /// A predicate function registered by name
    Custom(String),
}

impl Predicate {
    /// `a == b`
    pub fn eq(a: Term, b: Term) -> Self {
        Predicate::Eq([a, b])
    }

    /// `a != b`
    pub fn ne(a: Term, b: Term) -> Self {
        Predicate::Ne([a, b])
    }

    /// Wrap in `not`
    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    fn collect_vars<'a>(&'a self, vars: &mut Vec<&'a VarRef>) {
        match self {
            Predicate::Eq(terms) | Predicate::Ne(terms) => {
                vars.extend(terms.iter().filter_map(Term::as_var))
            }
            Predicate::Present(term) | Predicate::Truthy(term) => vars.extend(term.as_var()),
            Predicate::Not(inner) => inner.collect_vars(vars),
            Predicate::All(items) | Predicate::Any(items) => {
                for item in items {
                    item.collect_vars(vars);
                }
            }
            Predicate::Custom(_) => {}
        }
    }

    fn collect_custom<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Predicate::Custom(name) => names.push(name),
            Predicate::Not(inner) => inner.collect_custom(names),
            Predicate::All(items) | Predicate::Any(items) => {
                for item in items {
                    item.collect_custom(names);
                }
            }
            _ => {}
        }
    }
}

/// An action to invoke, with an input record built from the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThenTemplate {
    pub action: ActionRef,
    #[serde(default)]
    pub input: BTreeMap<String, Term>,
}

impl ThenTemplate {
    /// A template invoking `action` with no input fields
    pub fn new(action: ActionRef) -> Self {
        Self {
            action,
            input: BTreeMap::new(),
        }
    }

    /// Set one input field.
    pub fn input(mut self, field: impl Into<String>, term: Term) -> Self {
        self.input.insert(field.into(), term);
        self
    }

    /// Build the concrete input record for `frame`.
    pub fn substitute(&self, sync: &SyncId, frame: &Frame) -> Result<Record> {
        substitute(&self.input, sync, frame)
    }
}

/// Resolve every term of a template against a frame.
pub(crate) fn substitute(
    template: &BTreeMap<String, Term>,
    sync: &SyncId,
    frame: &Frame,
) -> Result<Record> {
    template
        .iter()
        .map(|(field, term)| {
            term.resolve(frame)
                .map(|value| (field.clone(), value))
                .ok_or_else(|| EngineError::UnboundVariable {
                    sync: sync.clone(),
                    variable: term.to_string().trim_start_matches('?').to_string(),
                })
        })
        .collect()
}

/// Builder for syncs defined in code.
#[derive(Debug, Clone)]
pub struct SyncBuilder {
    rule: SyncRule,
}

impl SyncBuilder {
    /// Start a sync with the given id
    pub fn new(id: impl Into<SyncId>) -> Self {
        Self {
            rule: SyncRule {
                id: id.into(),
                when: Vec::new(),
                where_steps: Vec::new(),
                then: Vec::new(),
            },
        }
    }

    /// Append a `when` pattern. Patterns join left to right.
    pub fn when(mut self, pattern: ActionPattern) -> Self {
        self.rule.when.push(pattern);
        self
    }

    /// Append a query step binding each returned row under `bind`.
    pub fn query<I, K>(mut self, query: ActionRef, input: I, bind: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = (K, Term)>,
        K: Into<String>,
    {
        self.rule.where_steps.push(WhereStep::Query {
            query,
            input: input.into_iter().map(|(k, t)| (k.into(), t)).collect(),
            bind: bind.into(),
        });
        self
    }

    /// Append a filter step.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.rule.where_steps.push(WhereStep::Filter { predicate });
        self
    }

    /// Append a projection of `from` into a new variable.
    pub fn project(mut self, from: Term, into: impl Into<String>) -> Self {
        self.rule.where_steps.push(WhereStep::Project {
            from,
            into: into.into(),
        });
        self
    }

    /// Append a `then` template. Templates run in order.
    pub fn then(mut self, template: ThenTemplate) -> Self {
        self.rule.then.push(template);
        self
    }

    pub fn build(self) -> SyncRule {
        self.rule
    }
}

/// The static table of syncs an engine runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncTable {
    #[serde(default)]
    pub syncs: Vec<SyncRule>,
}

impl SyncTable {
    /// A table holding `syncs` in evaluation order
    pub fn new(syncs: Vec<SyncRule>) -> Self {
        Self { syncs }
    }

    /// Parse a `syncs:` document.
    pub fn from_yaml_str(yaml: &str) -> std::result::Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a sync table from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Append one rule.
    pub fn push(&mut self, rule: SyncRule) {
        self.syncs.push(rule);
    }

    /// Append all syncs of another table.
    pub fn merge(&mut self, other: SyncTable) {
        self.syncs.extend(other.syncs);
    }

    pub fn len(&self) -> usize {
        self.syncs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.syncs.is_empty()
    }

    /// Validate every sync against `registry`.
    pub fn compile(&self, registry: &ActionRegistry) -> Result<Vec<CompiledSync>> {
        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(self.syncs.len());
        for rule in &self.syncs {
            if !seen.insert(rule.id.clone()) {
                return Err(EngineError::InvalidSync {
                    sync: rule.id.clone(),
                    reason: "duplicate sync id".to_string(),
                });
            }
            compiled.push(CompiledSync::compile(rule.clone(), registry)?);
        }
        Ok(compiled)
    }
}

impl FromIterator<SyncRule> for SyncTable {
    fn from_iter<T: IntoIterator<Item = SyncRule>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// A validated sync, ready to run.
#[derive(Debug, Clone)]
pub struct CompiledSync {
    pub rule: SyncRule,
    pub when: Vec<WhenPattern>,
}

impl CompiledSync {
    pub fn id(&self) -> &SyncId {
        &self.rule.id
    }

    /// Whether the sync has `where` steps to run
    pub fn has_where(&self) -> bool {
        !self.rule.where_steps.is_empty()
    }

    /// Check a rule against the registry.
    ///
    /// Every variable a step or template reads must have been bound by the
    /// `when` clause or an earlier `where` step, so frames reaching `then`
    /// are total.
    pub fn compile(rule: SyncRule, registry: &ActionRegistry) -> Result<Self> {
        let invalid = |reason: String| EngineError::InvalidSync {
            sync: rule.id.clone(),
            reason,
        };

        if rule.when.is_empty() {
            return Err(invalid("`when` clause is empty".to_string()));
        }
        if rule.then.is_empty() {
            return Err(invalid("`then` clause is empty".to_string()));
        }

        let mut bound: BTreeSet<String> = BTreeSet::new();
        let mut when = Vec::with_capacity(rule.when.len());

        for pattern in &rule.when {
            let Some(descriptor) = registry.descriptor(&pattern.action) else {
                if registry.has_query(&pattern.action) {
                    return Err(invalid(format!(
                        "{} is a query and cannot appear in `when`",
                        pattern.action
                    )));
                }
                return Err(EngineError::UnknownAction(pattern.action.clone()));
            };

            if let Some(var) = pattern
                .input
                .values()
                .chain(pattern.output.values())
                .filter_map(Term::as_var)
                .find(|var| var.has_path())
            {
                return Err(invalid(format!(
                    "field paths are not allowed in `when` patterns ({})",
                    var
                )));
            }

            let expects = descriptor
                .implied_kind(pattern.output.keys().map(String::as_str))
                .map_err(&invalid)?;

            bound.extend(pattern.variables().into_iter().map(str::to_string));
            when.push(WhenPattern {
                pattern: pattern.clone(),
                expects,
            });
        }

        let require_bound = |bound: &BTreeSet<String>, var: &VarRef| {
            if bound.contains(&var.name) {
                Ok(())
            } else {
                Err(EngineError::UnboundVariable {
                    sync: rule.id.clone(),
                    variable: var.name.clone(),
                })
            }
        };
        let introduce = |bound: &mut BTreeSet<String>, name: &str| {
            if bound.insert(name.to_string()) {
                Ok(())
            } else {
                Err(invalid(format!("variable ?{} is bound twice", name)))
            }
        };

        for step in &rule.where_steps {
            match step {
                WhereStep::Query { query, input, bind } => {
                    if !registry.has_query(query) {
                        return Err(EngineError::UnknownQuery(query.clone()));
                    }
                    for var in input.values().filter_map(Term::as_var) {
                        require_bound(&bound, var)?;
                    }
                    introduce(&mut bound, bind)?;
                }
                WhereStep::Filter { predicate } => {
                    let mut vars = Vec::new();
                    predicate.collect_vars(&mut vars);
                    for var in vars {
                        require_bound(&bound, var)?;
                    }
                    let mut names = Vec::new();
                    predicate.collect_custom(&mut names);
                    if let Some(name) = names.into_iter().find(|n| registry.predicate(n).is_none()) {
                        return Err(EngineError::UnknownPredicate(name.to_string()));
                    }
                }
                WhereStep::Project { from, into } => {
                    if let Some(var) = from.as_var() {
                        require_bound(&bound, var)?;
                    }
                    introduce(&mut bound, into)?;
                }
            }
        }

        for template in &rule.then {
            if !registry.has_action(&template.action) {
                return Err(EngineError::UnknownAction(template.action.clone()));
            }
            for var in template.input.values().filter_map(Term::as_var) {
                require_bound(&bound, var)?;
            }
        }

        Ok(Self { rule, when })
    }
}
