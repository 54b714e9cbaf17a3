//! Commands Layer
//!
//! Handlers the UI shell calls. Every handler returns a [`CommandResult`]
//! instead of failing, so anticipated errors reach the caller as data.

mod conversion_cmd;
mod image_cmd;
mod lead_cmd;

pub use conversion_cmd::*;
pub use image_cmd::*;
pub use lead_cmd::*;

use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, DomainResult};

/// Uniform call result: `{success, data?, error?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CommandError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandError {
    /// `ValidationError`, `ReferenceError`, `ConflictError`, `TransportError` or `DecodeError`
    pub kind: String,
    pub message: String,
}

impl<T> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: DomainError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(CommandError::from(&error)),
        }
    }

    pub fn error_kind(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.kind.as_str())
    }

    /// Back to a `Result` for callers on this side of the boundary
    pub fn into_result(self) -> DomainResult<T> {
        match (self.data, self.error) {
            (_, Some(error)) => Err(error.into()),
            (Some(data), None) => Ok(data),
            (None, None) => Err(DomainError::Transport("Command returned no data".into())),
        }
    }
}

impl<T> From<DomainResult<T>> for CommandResult<T> {
    fn from(result: DomainResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => {
                log::debug!("Command failed: {}", e);
                Self::err(e)
            }
        }
    }
}

impl From<&DomainError> for CommandError {
    fn from(error: &DomainError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.message().to_string(),
        }
    }
}

impl From<CommandError> for DomainError {
    fn from(error: CommandError) -> Self {
        match error.kind.as_str() {
            "ValidationError" => DomainError::Validation(error.message),
            "ReferenceError" => DomainError::NotFound(error.message),
            "ConflictError" => DomainError::Conflict(error.message),
            "DecodeError" => DomainError::Decode(error.message),
            _ => DomainError::Transport(error.message),
        }
    }
}
