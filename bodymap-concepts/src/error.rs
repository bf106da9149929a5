//! Error types for the reference app

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("engine error: {0}")]
    Engine(#[from] tock::EngineError),

    #[error("sync table error: {0}")]
    Config(#[from] tock::ConfigError),

    /// The seeding `request` occurrence carried no request id
    #[error("request action returned no request id")]
    MissingRequestId,
}

pub type Result<T> = std::result::Result<T, AppError>;
