//! Reference concepts for bodymap
//!
//! In-memory implementations of the concepts the authentication flows need,
//! the bundled sync table wiring them together, and [`App`], which assembles
//! both into a running engine.

pub mod auth;
pub mod error;
pub mod requesting;
pub mod sessioning;

pub use auth::UserAuthentication;
pub use error::{AppError, Result};
pub use requesting::Requesting;
pub use sessioning::Sessioning;

use bodymap_types::{Record, Value};
use std::sync::Arc;
use tock::{ActionRegistry, Engine, EngineConfig, SyncTable, TickReport};

/// Field carrying an action's error message
pub const ERROR: &str = tock::ERROR_FIELD;

/// The bundled authentication syncs
pub const AUTH_SYNCS: &str = include_str!("../syncs/auth.yml");

pub(crate) fn text_field<'a>(record: &'a Record, field: &str) -> Option<&'a str> {
    record.get(field).and_then(Value::as_str)
}

/// Parse the bundled sync table.
pub fn auth_syncs() -> std::result::Result<SyncTable, tock::ConfigError> {
    SyncTable::from_yaml_str(AUTH_SYNCS)
}

/// One served request: its id, the response (if any) and the tick report.
#[derive(Debug, Clone)]
pub struct Served {
    pub request: String,
    pub response: Option<Record>,
    pub report: TickReport,
}

/// The reference concepts and an engine running a sync table over them.
#[derive(Debug, Clone)]
pub struct App {
    pub engine: Engine,
    pub requesting: Arc<Requesting>,
    pub users: Arc<UserAuthentication>,
    pub sessions: Arc<Sessioning>,
}

impl App {
    /// Register the reference concepts and validate `table` against them.
    pub fn new(table: &SyncTable, config: EngineConfig) -> Result<Self> {
        let requesting = Arc::new(Requesting::new());
        let users = Arc::new(UserAuthentication::new());
        let sessions = Arc::new(Sessioning::new());

        let mut registry = ActionRegistry::builder();
        registry
            .concept(requesting.clone())
            .concept(users.clone())
            .concept(sessions.clone());

        let engine = Engine::new(registry.build(), table, config)?;
        Ok(Self {
            engine,
            requesting,
            users,
            sessions,
        })
    }

    /// An app running the bundled authentication syncs
    pub fn with_auth_syncs(config: EngineConfig) -> Result<Self> {
        Self::new(&auth_syncs()?, config)
    }

    /// Open a request with `input` and run its tick to completion.
    pub async fn request(&self, input: Record) -> Result<Served> {
        let report = self
            .engine
            .invoke(&requesting::request_action(), input)
            .await?;

        let request = report
            .root()
            .and_then(|root| text_field(root.output(), "request"))
            .map(str::to_string)
            .ok_or(AppError::MissingRequestId)?;

        let response = self.requesting.response(&request);
        if response.is_none() {
            let path = self
                .requesting
                .request_input(&request)
                .and_then(|input| text_field(&input, "path").map(str::to_string))
                .unwrap_or_default();
            tracing::warn!(request = %request, path = %path, "tick finished without a response");
        }
        Ok(Served {
            request,
            response,
            report,
        })
    }
}
