//! Roof Finder Backend
//!
//! Map-driven lead capture for roofing prospects.
//!
//! Layered architecture:
//! - domain: Core entities and business rules
//! - codec: Stored geometry text <-> structured geometry
//! - repository: SQLite persistence behind async traits
//! - drawing, query, session: Map interaction state for one map instance
//! - images, conversion: Lead photos and promotion into CRM records
//! - commands: Uniform-result handlers for the UI shell

use std::sync::Arc;

pub mod codec;
pub mod commands;
pub mod config;
pub mod conversion;
pub mod domain;
pub mod drawing;
pub mod images;
pub mod query;
pub mod repository;
pub mod session;

use config::AppConfig;
use conversion::ConversionWorkflow;
use domain::DomainResult;
use images::ImageService;
use repository::{init_db, CrmRepository, DbState, ImageRepository, LeadRepository};

/// Application state shared across commands
pub struct AppState {
    pub config: AppConfig,
    pub db_state: DbState,
    pub leads: Arc<LeadRepository>,
    pub crm: Arc<CrmRepository>,
    pub images: Arc<ImageService>,
    pub conversion: Arc<ConversionWorkflow>,
}

/// Start logging, open the database and wire up the services
pub async fn bootstrap(config: AppConfig) -> DomainResult<AppState> {
    config.validate()?;

    if let Some(log_dir) = &config.log_dir {
        match rolling_logger::init_logger(log_dir, "RoofFinder") {
            Ok(()) => log::info!("Logger initialized in {}", log_dir.display()),
            // Already installed by an earlier bootstrap in this process
            Err(e) => log::debug!("Rolling logger not installed: {}", e),
        }
    }

    let db_state = init_db(&config.database_path).await?;

    let leads = Arc::new(LeadRepository::new(db_state.conn.clone()));
    let crm = Arc::new(CrmRepository::new(db_state.conn.clone()));
    let images = Arc::new(ImageService::new(
        Arc::new(ImageRepository::new(db_state.conn.clone())),
        config.image_dir.clone(),
        &config.url_signing_secret,
        config.signed_url_ttl_secs,
    ));
    let conversion = Arc::new(ConversionWorkflow::new(
        leads.clone(),
        crm.clone(),
        crm.clone(),
        crm.clone(),
    ));

    log::info!(
        "Roof Finder ready (db {}, images {})",
        db_state.path.display(),
        config.image_dir.display()
    );

    Ok(AppState {
        config,
        db_state,
        leads,
        crm,
        images,
        conversion,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// In-memory database, images under a temp dir
    pub(crate) async fn test_state() -> (TempDir, AppState) {
        let dir = TempDir::new().unwrap();
        let config = AppConfig {
            database_path: PathBuf::from(":memory:"),
            image_dir: dir.path().join("images"),
            current_user: "tester".into(),
            ..AppConfig::default()
        };
        let state = bootstrap(config).await.unwrap();
        (dir, state)
    }
}
