//! Database Connection and Setup
//!
//! Manages the SQLite connection and schema migrations.

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::{DomainError, DomainResult};

/// Current schema version, stored in `PRAGMA user_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Database state wrapper
#[derive(Clone)]
pub struct DbState {
    pub conn: Arc<Mutex<Connection>>,
    pub path: PathBuf,
}

/// Open the database at `db_path` (or `:memory:`) and run migrations
pub async fn init_db(db_path: &Path) -> DomainResult<DbState> {
    let conn = if db_path == Path::new(":memory:") {
        Connection::open_in_memory()
    } else {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DomainError::Transport(format!("Failed to create db dir: {}", e)))?;
            }
        }
        Connection::open(db_path)
    }
    .map_err(|e| DomainError::Transport(format!("Failed to open db: {}", e)))?;

    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|e| DomainError::Transport(e.to_string()))?;

    run_migrations(&conn)?;
    log::info!("Database ready at {}", db_path.display());

    Ok(DbState {
        conn: Arc::new(Mutex::new(conn)),
        path: db_path.to_path_buf(),
    })
}

fn schema_version(conn: &Connection) -> DomainResult<i64> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| DomainError::Transport(e.to_string()))
}

/// Run database migrations
fn run_migrations(conn: &Connection) -> DomainResult<()> {
    let version = schema_version(conn)?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    if version < 1 {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS leads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                geometry TEXT NOT NULL,
                min_lng REAL,
                min_lat REAL,
                max_lng REAL,
                max_lat REAL,
                condition_label TEXT NOT NULL DEFAULT 'other',
                condition_score INTEGER NOT NULL DEFAULT 3 CHECK (condition_score BETWEEN 1 AND 5),
                status TEXT NOT NULL DEFAULT 'new',
                notes TEXT,
                street TEXT,
                city TEXT,
                state TEXT,
                zip TEXT,
                estimated_sqft REAL,
                estimated_repair_cost REAL,
                linked_prospect_id INTEGER,
                linked_account_id INTEGER,
                linked_property_id INTEGER,
                created_by TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_leads_bbox ON leads(min_lng, max_lng, min_lat, max_lat);
            CREATE INDEX IF NOT EXISTS idx_leads_status ON leads(status);
            CREATE INDEX IF NOT EXISTS idx_leads_updated ON leads(updated_at);

            CREATE TABLE IF NOT EXISTS lead_tags (
                lead_id INTEGER NOT NULL REFERENCES leads(id) ON DELETE CASCADE,
                tag TEXT NOT NULL,
                PRIMARY KEY (lead_id, tag)
            );
            CREATE INDEX IF NOT EXISTS idx_lead_tags_tag ON lead_tags(tag);

            CREATE TABLE IF NOT EXISTS lead_images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                lead_id INTEGER NOT NULL REFERENCES leads(id) ON DELETE CASCADE,
                file_ref TEXT NOT NULL,
                content_type TEXT NOT NULL,
                description TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_lead_images_lead ON lead_images(lead_id);

            CREATE TABLE IF NOT EXISTS prospects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                street TEXT,
                city TEXT,
                state TEXT,
                zip TEXT,
                notes TEXT NOT NULL DEFAULT '',
                tags TEXT NOT NULL DEFAULT '[]',
                status TEXT NOT NULL,
                source_lead_id INTEGER,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS properties (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                street TEXT,
                city TEXT,
                state TEXT,
                zip TEXT,
                account_id INTEGER,
                estimated_sqft REAL,
                source_lead_id INTEGER,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                notes TEXT,
                due_date TEXT NOT NULL,
                priority TEXT NOT NULL DEFAULT 'medium',
                status TEXT NOT NULL DEFAULT 'open',
                lead_id INTEGER,
                account_id INTEGER,
                property_id INTEGER,
                prospect_id INTEGER,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_lead ON tasks(lead_id);",
        )
        .map_err(|e| DomainError::Transport(format!("Migration to v1 failed: {}", e)))?;
    }

    conn.execute_batch(&format!("PRAGMA user_version = {};", SCHEMA_VERSION))
        .map_err(|e| DomainError::Transport(e.to_string()))?;
    log::info!("Database migrated from v{} to v{}", version, SCHEMA_VERSION);
    Ok(())
}

/// Current time in Unix milliseconds
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
