//! Domain Layer - Core Entity Trait
//!
//! This trait defines the basic contract for all domain entities.
//! All entities must have a unique ID and be thread-safe.

use serde::{Deserialize, Serialize};

/// Core trait for all domain entities
pub trait Entity: Sized + Send + Sync + Clone {
    /// The type of the entity's unique identifier
    type Id: Copy + Eq + std::hash::Hash + Send + Sync;

    /// Returns the entity's unique identifier
    fn id(&self) -> Self::Id;
}

/// Common result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level errors
///
/// Validation and Conflict are expected outcomes: they block the requested
/// action and leave all state unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DomainError {
    /// Missing or out-of-range input
    Validation(String),
    /// Referenced lead/image/entity does not exist
    NotFound(String),
    /// Target link already set
    Conflict(String),
    /// Storage, filesystem or network failure
    Transport(String),
    /// Stored geometry could not be parsed
    Decode(String),
}

impl DomainError {
    /// Stable name used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "ValidationError",
            DomainError::NotFound(_) => "ReferenceError",
            DomainError::Conflict(_) => "ConflictError",
            DomainError::Transport(_) => "TransportError",
            DomainError::Decode(_) => "DecodeError",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            DomainError::Validation(msg)
            | DomainError::NotFound(msg)
            | DomainError::Conflict(msg)
            | DomainError::Transport(msg)
            | DomainError::Decode(msg) => msg,
        }
    }
}

impl std::fmt::Display for DomainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DomainError::Validation(msg) => write!(f, "Invalid input: {}", msg),
            DomainError::NotFound(msg) => write!(f, "Not found: {}", msg),
            DomainError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            DomainError::Transport(msg) => write!(f, "Transport error: {}", msg),
            DomainError::Decode(msg) => write!(f, "Decode error: {}", msg),
        }
    }
}

impl std::error::Error for DomainError {}
