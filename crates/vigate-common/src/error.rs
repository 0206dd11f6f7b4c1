use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("Failed to bind listener: {0}")]
    Bind(String),

    #[error("Failed to load component {path}: {reason}")]
    ComponentLoad { path: PathBuf, reason: String },

    #[error("Failed to open method {method}: {reason}")]
    MethodOpen { method: String, reason: String },

    #[error("Execution engine error: {0}")]
    Engine(String),

    #[error("Run did not complete within {0}ms")]
    Timeout(u64),

    #[error("Previous run of {0} is still active")]
    RunStillActive(String),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Cannot assign {value:?} to parameter {parameter}: {reason}")]
    Coercion {
        parameter: String,
        value: String,
        reason: String,
    },

    #[error("Missing output parameter: {0}")]
    MissingOutput(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Server is stopped")]
    Stopped,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GateError {
    pub fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        GateError::ComponentLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn open(method: &str, reason: impl ToString) -> Self {
        GateError::MethodOpen {
            method: method.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GateError>;
