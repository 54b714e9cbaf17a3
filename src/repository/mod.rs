//! Repository Layer
//!
//! Data access abstractions and implementations.

mod traits;
pub mod db;
mod lead_repo;
mod image_repo;
mod crm_repo;


pub use traits::Repository;
pub use db::{init_db, DbState};
pub use lead_repo::LeadRepository;
pub use image_repo::ImageRepository;
pub use crm_repo::CrmRepository;

use crate::domain::DomainError;

/// Storage failures surface as transport errors
pub(crate) fn db_err(e: rusqlite::Error) -> DomainError {
    DomainError::Transport(e.to_string())
}
