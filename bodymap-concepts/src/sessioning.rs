//! Sessioning: login sessions bound to a user

use crate::{text_field, ERROR};
use bodymap_types::{record, ActionRef, Record, Value};
use parking_lot::RwLock;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tock::{Concept, QueryError, RegistryBuilder, Variant};

pub const CONCEPT: &str = "Sessioning";

pub fn start_action() -> ActionRef {
    ActionRef::new(CONCEPT, "start")
}

pub fn end_action() -> ActionRef {
    ActionRef::new(CONCEPT, "end")
}

/// `Sessioning._getSession`: the session row, or no rows for an unknown id
pub fn get_session_query() -> ActionRef {
    ActionRef::new(CONCEPT, "_getSession")
}

/// `Sessioning._status`: always one row, `{active, user}`
pub fn status_query() -> ActionRef {
    ActionRef::new(CONCEPT, "_status")
}

#[derive(Debug, Clone)]
struct Session {
    user: String,
    active: bool,
}

#[derive(Debug, Default)]
pub struct Sessioning {
    next_id: AtomicU64,
    sessions: RwLock<HashMap<String, Session>>,
}

fn session_field(input: &Record) -> Result<&str, QueryError> {
    text_field(input, "session")
        .ok_or_else(|| QueryError::InvalidInput("`session` must be a string".to_string()))
}

impl Sessioning {
    pub fn new() -> Self {
        Self::default()
    }

    /// `{user} -> {session} | {error}`
    pub fn start(&self, input: &Record) -> Record {
        let Some(user) = text_field(input, "user") else {
            return record([(ERROR, json!("user is required"))]);
        };
        let session = format!("s{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.sessions.write().insert(
            session.clone(),
            Session {
                user: user.to_string(),
                active: true,
            },
        );
        tracing::debug!(session = %session, user, "session started");
        record([("session", json!(session))])
    }

    /// `{session} -> {session} | {error}`. Ended sessions stay known but inactive.
    pub fn end(&self, input: &Record) -> Record {
        let Some(id) = text_field(input, "session") else {
            return record([(ERROR, json!("session is required"))]);
        };
        let mut sessions = self.sessions.write();
        match sessions.get_mut(id) {
            Some(session) if session.active => {
                session.active = false;
                tracing::debug!(session = %id, "session ended");
                record([("session", json!(id))])
            }
            Some(_) => record([(ERROR, json!("session already ended"))]),
            None => record([(ERROR, json!("unknown session"))]),
        }
    }

    /// `{session} -> [{session, user, active}]`, empty for unknown sessions
    pub fn get_session(&self, input: &Record) -> Result<Vec<Record>, QueryError> {
        let id = session_field(input)?;
        Ok(self
            .sessions
            .read()
            .get(id)
            .map(|s| {
                record([
                    ("session", json!(id)),
                    ("user", json!(s.user)),
                    ("active", json!(s.active)),
                ])
            })
            .into_iter()
            .collect())
    }

    /// `{session} -> [{active, user}]`, always exactly one row.
    ///
    /// Unknown sessions report `active: false` and a null user, so that both
    /// halves of a paired response sync can key on the same query.
    pub fn status(&self, input: &Record) -> Result<Vec<Record>, QueryError> {
        let id = session_field(input)?;
        let row = match self.sessions.read().get(id) {
            Some(s) => record([("active", json!(s.active)), ("user", json!(s.user))]),
            None => record([("active", json!(false)), ("user", Value::Null)]),
        };
        Ok(vec![row])
    }
}

impl Concept for Sessioning {
    fn name(&self) -> &str {
        CONCEPT
    }

    fn register(self: Arc<Self>, registry: &mut RegistryBuilder) {
        let this = self.clone();
        registry.action_fn(
            start_action(),
            vec![Variant::success("started", ["session"]), Variant::error()],
            move |input| Ok(this.start(&input)),
        );

        let this = self.clone();
        registry.action_fn(
            end_action(),
            vec![Variant::success("ended", ["session"]), Variant::error()],
            move |input| Ok(this.end(&input)),
        );

        let this = self.clone();
        registry.query_fn(get_session_query(), move |input| this.get_session(&input));

        let this = self;
        registry.query_fn(status_query(), move |input| this.status(&input));
    }
}
