//! Small in-memory concepts shared by the integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tock::{
    record, ActionError, ActionRef, ActionRegistry, Concept, QueryError, Record, RegistryBuilder,
    Variant,
};

pub fn request() -> ActionRef {
    ActionRef::new("Requesting", "request")
}

pub fn respond() -> ActionRef {
    ActionRef::new("Requesting", "respond")
}

pub fn register() -> ActionRef {
    ActionRef::new("UserAuthentication", "register")
}

/// Request ids `r1`, `r2`, ... and a log of delivered responses
#[derive(Default)]
pub struct Requests {
    next: AtomicUsize,
    pub responses: Mutex<HashMap<String, Record>>,
}

impl Concept for Requests {
    fn name(&self) -> &str {
        "Requesting"
    }

    fn register(self: Arc<Self>, builder: &mut RegistryBuilder) {
        let this = self.clone();
        builder.action_fn(
            request(),
            vec![Variant::success("request", ["request"])],
            move |_| {
                let n = this.next.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(record([("request", json!(format!("r{}", n)))]))
            },
        );
        let this = self;
        builder.action_fn(respond(), vec![Variant::success("request", ["request"])], move |input| {
            let id = input
                .get("request")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ActionError::new("respond needs a request id"))?
                .to_string();
            this.responses.lock().insert(id.clone(), input);
            Ok(record([("request", json!(id))]))
        });
    }
}

impl Requests {
    pub fn response(&self, id: &str) -> Option<Record> {
        self.responses.lock().get(id).cloned()
    }
}

/// Usernames mapped to user ids
#[derive(Default)]
pub struct Users {
    pub users: Mutex<HashMap<String, String>>,
}

impl Concept for Users {
    fn name(&self) -> &str {
        "UserAuthentication"
    }

    fn register(self: Arc<Self>, builder: &mut RegistryBuilder) {
        let this = self;
        builder.action_fn(
            register(),
            vec![Variant::success("registered", ["user"]), Variant::error()],
            move |input| {
                let username = input
                    .get("username")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let mut users = this.users.lock();
                if users.contains_key(&username) {
                    return Ok(record([("error", json!("username taken"))]));
                }
                let id = format!("u{}", users.len() + 1);
                users.insert(username, id.clone());
                Ok(record([("user", json!(id))]))
            },
        );
    }
}

pub const REGISTER_SYNCS: &str = r#"
syncs:
  - id: Register
    when:
      - action: Requesting.request
        input: { path: /auth/register, username: "?username", password: "?password" }
        output: { request: "?request" }
    then:
      - action: UserAuthentication.register
        input: { username: "?username", password: "?password" }

  - id: RegisterResponse
    when:
      - action: Requesting.request
        input: { path: /auth/register }
        output: { request: "?request" }
      - action: UserAuthentication.register
        output: { user: "?user" }
    then:
      - action: Requesting.respond
        input: { request: "?request", user: "?user" }

  - id: RegisterErrorResponse
    when:
      - action: Requesting.request
        input: { path: /auth/register }
        output: { request: "?request" }
      - action: UserAuthentication.register
        output: { error: "?error" }
    then:
      - action: Requesting.respond
        input: { request: "?request", error: "?error" }
"#;

pub struct Fixture {
    pub requests: Arc<Requests>,
    pub users: Arc<Users>,
    pub builder: RegistryBuilder,
}

pub fn fixture() -> Fixture {
    let requests = Arc::new(Requests::default());
    let users = Arc::new(Users::default());
    let mut builder = ActionRegistry::builder();
    builder.concept(requests.clone()).concept(users.clone());
    Fixture {
        requests,
        users,
        builder,
    }
}

/// A query that counts its calls and fails for `{"fail": true}`
pub fn counting_query(builder: &mut RegistryBuilder, query: ActionRef) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    builder.query_fn(query, move |input| {
        counter.fetch_add(1, Ordering::SeqCst);
        if input.get("fail") == Some(&json!(true)) {
            return Err(QueryError::Failed("backing store unavailable".to_string()));
        }
        Ok(vec![input])
    });
    calls
}

pub fn register_input(username: &str) -> Record {
    record([
        ("path", json!("/auth/register")),
        ("username", json!(username)),
        ("password", json!("b")),
    ])
}
