//! UserAuthentication: usernames and password credentials
//!
//! Passwords are never stored; each user keeps a blake3 digest derived from
//! the user id and the password.

use crate::{text_field, ERROR};
use bodymap_types::{record, ActionRef, Record};
use parking_lot::RwLock;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tock::{Concept, QueryError, RegistryBuilder, Variant};

pub const CONCEPT: &str = "UserAuthentication";

const DIGEST_CONTEXT: &str = "bodymap 2026-01 user password";

pub fn register_action() -> ActionRef {
    ActionRef::new(CONCEPT, "register")
}

pub fn authenticate_action() -> ActionRef {
    ActionRef::new(CONCEPT, "authenticate")
}

pub fn get_username_query() -> ActionRef {
    ActionRef::new(CONCEPT, "_getUsername")
}

#[derive(Debug, Clone)]
struct Credentials {
    username: String,
    digest: blake3::Hash,
}

#[derive(Debug, Default)]
struct Users {
    by_id: HashMap<String, Credentials>,
    by_username: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct UserAuthentication {
    users: RwLock<Users>,
}

fn digest(user: &str, password: &str) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new_derive_key(DIGEST_CONTEXT);
    hasher.update(user.as_bytes());
    hasher.update(&[0]);
    hasher.update(password.as_bytes());
    hasher.finalize()
}

fn error(message: &str) -> Record {
    record([(ERROR, json!(message))])
}

impl UserAuthentication {
    pub fn new() -> Self {
        Self::default()
    }

    /// `{username, password} -> {user} | {error}`
    pub fn register_user(&self, input: &Record) -> Record {
        let (Some(username), Some(password)) =
            (text_field(input, "username"), text_field(input, "password"))
        else {
            return error("username and password are required");
        };
        if username.trim().is_empty() || password.is_empty() {
            return error("username and password must not be empty");
        }

        let mut users = self.users.write();
        if users.by_username.contains_key(username) {
            return error("username taken");
        }

        let user = format!("u{}", users.by_id.len() + 1);
        users.by_id.insert(
            user.clone(),
            Credentials {
                username: username.to_string(),
                digest: digest(&user, password),
            },
        );
        users.by_username.insert(username.to_string(), user.clone());
        tracing::debug!(user = %user, "user registered");
        record([("user", json!(user))])
    }

    /// `{username, password} -> {user} | {error}`
    pub fn authenticate(&self, input: &Record) -> Record {
        let (Some(username), Some(password)) =
            (text_field(input, "username"), text_field(input, "password"))
        else {
            return error("username and password are required");
        };

        let users = self.users.read();
        let verified = users.by_username.get(username).filter(|user| {
            users
                .by_id
                .get(user.as_str())
                .is_some_and(|creds| creds.digest == digest(user, password))
        });
        match verified {
            Some(user) => record([("user", json!(user))]),
            None => error("invalid username or password"),
        }
    }

    /// `{user} -> [{username}]`, empty for unknown users
    pub fn get_username(&self, input: &Record) -> Result<Vec<Record>, QueryError> {
        let user = text_field(input, "user")
            .ok_or_else(|| QueryError::InvalidInput("`user` must be a string".to_string()))?;
        Ok(self
            .users
            .read()
            .by_id
            .get(user)
            .map(|creds| record([("username", json!(creds.username))]))
            .into_iter()
            .collect())
    }
}

impl Concept for UserAuthentication {
    fn name(&self) -> &str {
        CONCEPT
    }

    fn register(self: Arc<Self>, registry: &mut RegistryBuilder) {
        let variants = || vec![Variant::success("user", ["user"]), Variant::error()];

        let this = self.clone();
        registry.action_fn(register_action(), variants(), move |input| {
            Ok(this.register_user(&input))
        });

        let this = self.clone();
        registry.action_fn(authenticate_action(), variants(), move |input| {
            Ok(this.authenticate(&input))
        });

        let this = self;
        registry.query_fn(get_username_query(), move |input| this.get_username(&input));
    }
}
