use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Problems with a check definition relative to the current tables.
/// Fatal to that check's compile attempt only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("check references unknown table '{table}'")]
    UnknownTable { table: String },

    #[error("malformed target_table: {0}")]
    MalformedTargets(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Plan,
    Execute,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Plan => f.write_str("planner"),
            Stage::Execute => f.write_str("executor"),
        }
    }
}

/// Planner/executor could not produce a usable artifact.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("{stage} unavailable: {message}")]
    Unavailable { stage: Stage, message: String },

    #[error("{stage} timed out after {seconds}s")]
    Timeout { stage: Stage, seconds: u64 },

    #[error("{stage} returned a malformed response: {message}")]
    Malformed { stage: Stage, message: String },
}

impl CapabilityError {
    pub fn stage(&self) -> Stage {
        match self {
            CapabilityError::Unavailable { stage, .. }
            | CapabilityError::Timeout { stage, .. }
            | CapabilityError::Malformed { stage, .. } => *stage,
        }
    }

    /// Classify an error raised by a capability implementation. Providers may
    /// raise a `CapabilityError` themselves (e.g. `Malformed`); anything else
    /// counts as the capability being unavailable.
    pub fn from_anyhow(stage: Stage, err: anyhow::Error) -> Self {
        match err.downcast::<CapabilityError>() {
            Ok(cap) => cap,
            Err(other) => CapabilityError::Unavailable {
                stage,
                message: format!("{:#}", other),
            },
        }
    }
}

/// Everything that can go wrong while compiling one check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error("cache corruption: {0}")]
    Corruption(String),

    #[error("ledger append failed: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Input,
    Capability,
    Corruption,
    Storage,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorClass::Input => "input",
            ErrorClass::Capability => "capability",
            ErrorClass::Corruption => "corruption",
            ErrorClass::Storage => "storage",
        };
        f.write_str(s)
    }
}

impl CompileError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CompileError::Input(_) => ErrorClass::Input,
            CompileError::Capability(_) => ErrorClass::Capability,
            CompileError::Corruption(_) => ErrorClass::Corruption,
            CompileError::Storage(_) => ErrorClass::Storage,
        }
    }

    /// Capability failures are transient: the next pass retries them even if
    /// no input changed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CompileError::Capability(_))
    }
}

/// Invalid or unreadable workflow configuration.
#[derive(Debug, Clone)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}
