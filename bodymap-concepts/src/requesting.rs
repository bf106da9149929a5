//! Requesting: inbound requests and the responses delivered to them
//!
//! `request` is how an external caller seeds a tick; `respond` is what the
//! syncs eventually invoke to answer it. The caller reads the answer back
//! with [`Requesting::response`] once the tick has finished.

use crate::{text_field, ERROR};
use bodymap_types::{record, ActionRef, Record};
use parking_lot::RwLock;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tock::{Concept, RegistryBuilder, Variant};

pub const CONCEPT: &str = "Requesting";

/// `Requesting.request`: opens a request, seeding a tick
pub fn request_action() -> ActionRef {
    ActionRef::new(CONCEPT, "request")
}

/// `Requesting.respond`: answers an open request
pub fn respond_action() -> ActionRef {
    ActionRef::new(CONCEPT, "respond")
}

#[derive(Debug, Clone)]
struct PendingRequest {
    input: Record,
    response: Option<Record>,
}

#[derive(Debug, Default)]
pub struct Requesting {
    next_id: AtomicU64,
    requests: RwLock<HashMap<String, PendingRequest>>,
}

impl Requesting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a request. Always succeeds with `{request}`.
    pub fn request(&self, input: Record) -> Record {
        let id = format!("r{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        tracing::debug!(request = %id, "request opened");
        self.requests.write().insert(
            id.clone(),
            PendingRequest {
                input,
                response: None,
            },
        );
        record([("request", json!(id))])
    }

    /// Deliver a response. The response is every input field but `request`.
    ///
    /// Fails for unknown requests and for requests already answered.
    pub fn respond(&self, input: Record) -> Record {
        let Some(id) = text_field(&input, "request").map(str::to_string) else {
            return record([(ERROR, json!("missing request id"))]);
        };

        let mut requests = self.requests.write();
        let Some(pending) = requests.get_mut(&id) else {
            return record([(ERROR, json!(format!("unknown request {}", id)))]);
        };
        if pending.response.is_some() {
            return record([(ERROR, json!(format!("request {} already answered", id)))]);
        }

        let mut response = input;
        response.remove("request");
        pending.response = Some(response);
        tracing::debug!(request = %id, "response delivered");
        record([("request", json!(id))])
    }

    /// The response delivered to a request, if any
    pub fn response(&self, id: &str) -> Option<Record> {
        self.requests.read().get(id).and_then(|p| p.response.clone())
    }

    /// The input a request was opened with
    pub fn request_input(&self, id: &str) -> Option<Record> {
        self.requests.read().get(id).map(|p| p.input.clone())
    }

    /// Requests still waiting for a response
    pub fn pending(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .requests
            .read()
            .iter()
            .filter(|(_, p)| p.response.is_none())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

impl Concept for Requesting {
    fn name(&self) -> &str {
        CONCEPT
    }

    fn register(self: Arc<Self>, registry: &mut RegistryBuilder) {
        let this = self.clone();
        registry.action_fn(
            request_action(),
            vec![Variant::success("opened", ["request"])],
            move |input| Ok(this.request(input)),
        );

        let this = self;
        registry.action_fn(
            respond_action(),
            vec![Variant::success("responded", ["request"]), Variant::error()],
            move |input| Ok(this.respond(input)),
        );
    }
}
