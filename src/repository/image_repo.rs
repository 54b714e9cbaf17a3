//! Lead Image Repository
//!
//! Image metadata rows; the files themselves are handled by the image service.

use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::{DomainError, DomainResult, LeadId, LeadImage};
use super::db::now_millis;
use super::traits::Repository;
use super::db_err;

const IMAGE_COLUMNS: &str = "id, lead_id, file_ref, content_type, description, created_at";

pub struct ImageRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ImageRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Images of one lead, oldest first
    pub async fn list_for_lead(&self, lead_id: LeadId) -> DomainResult<Vec<LeadImage>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM lead_images WHERE lead_id = ?1 ORDER BY created_at, id",
                IMAGE_COLUMNS
            ))
            .map_err(db_err)?;
        let rows = stmt.query_map(params![lead_id], row_to_image).map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    pub async fn lead_exists(&self, lead_id: LeadId) -> DomainResult<bool> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM leads WHERE id = ?1", params![lead_id], |row| row.get(0))
            .map_err(db_err)?;
        Ok(count > 0)
    }
}

#[async_trait]
impl Repository<LeadImage> for ImageRepository {
    async fn create(&self, entity: &LeadImage) -> DomainResult<LeadImage> {
        let conn = self.conn.lock().await;
        let now = now_millis();

        conn.execute(
            "INSERT INTO lead_images (lead_id, file_ref, content_type, description, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![entity.lead_id, entity.file_ref, entity.content_type, entity.description, now],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                DomainError::NotFound(format!("Lead {} not found", entity.lead_id))
            }
            other => db_err(other),
        })?;

        Ok(LeadImage {
            id: conn.last_insert_rowid(),
            created_at: now,
            ..entity.clone()
        })
    }

    async fn find_by_id(&self, id: i64) -> DomainResult<Option<LeadImage>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM lead_images WHERE id = ?1", IMAGE_COLUMNS))
            .map_err(db_err)?;
        let mut rows = stmt.query(params![id]).map_err(db_err)?;
        match rows.next().map_err(db_err)? {
            Some(row) => Ok(Some(row_to_image(row).map_err(db_err)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> DomainResult<Vec<LeadImage>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM lead_images ORDER BY id", IMAGE_COLUMNS))
            .map_err(db_err)?;
        let rows = stmt.query_map([], row_to_image).map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    /// Only the description is editable
    async fn update(&self, entity: &LeadImage) -> DomainResult<LeadImage> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE lead_images SET description = ?1 WHERE id = ?2",
                params![entity.description, entity.id],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(DomainError::NotFound(format!("Image {} not found", entity.id)));
        }
        Ok(entity.clone())
    }

    async fn delete(&self, id: i64) -> DomainResult<()> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute("DELETE FROM lead_images WHERE id = ?1", params![id])
            .map_err(db_err)?;
        if changed == 0 {
            return Err(DomainError::NotFound(format!("Image {} not found", id)));
        }
        Ok(())
    }
}

fn row_to_image(row: &rusqlite::Row) -> rusqlite::Result<LeadImage> {
    Ok(LeadImage {
        id: row.get(0)?,
        lead_id: row.get(1)?,
        file_ref: row.get(2)?,
        content_type: row.get(3)?,
        description: row.get(4)?,
        created_at: row.get(5)?,
    })
}
