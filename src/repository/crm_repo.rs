//! CRM Repository
//!
//! Local SQLite stand-in for the prospect, property and task services a lead
//! is converted into.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::conversion::{PropertyService, ProspectService, TaskService};
use crate::domain::{
    Address, DomainError, DomainResult, FollowUpTask, LeadId, NewProperty, NewProspect, NewTask,
    Property, Prospect, TaskPriority,
};
use super::db::now_millis;
use super::db_err;

pub struct CrmRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CrmRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub async fn find_prospect(&self, id: i64) -> DomainResult<Option<Prospect>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT id, name, street, city, state, zip, notes, tags, status, source_lead_id, created_at FROM prospects WHERE id = ?1")
            .map_err(db_err)?;
        let mut rows = stmt.query(params![id]).map_err(db_err)?;
        let Some(row) = rows.next().map_err(db_err)? else {
            return Ok(None);
        };

        let tags_json: String = row.get(7).map_err(db_err)?;
        let tags: BTreeSet<String> = serde_json::from_str(&tags_json)
            .map_err(|e| DomainError::Transport(format!("Corrupt prospect tags: {}", e)))?;
        Ok(Some(Prospect {
            id: row.get(0).map_err(db_err)?,
            name: row.get(1).map_err(db_err)?,
            address: Address {
                street: row.get(2).map_err(db_err)?,
                city: row.get(3).map_err(db_err)?,
                state: row.get(4).map_err(db_err)?,
                zip: row.get(5).map_err(db_err)?,
            },
            notes: row.get(6).map_err(db_err)?,
            tags,
            status: row.get(8).map_err(db_err)?,
            source_lead_id: row.get(9).map_err(db_err)?,
            created_at: row.get(10).map_err(db_err)?,
        }))
    }

    pub async fn find_property(&self, id: i64) -> DomainResult<Option<Property>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT id, name, street, city, state, zip, account_id, estimated_sqft, source_lead_id, created_at FROM properties WHERE id = ?1")
            .map_err(db_err)?;
        let mut rows = stmt.query(params![id]).map_err(db_err)?;
        let Some(row) = rows.next().map_err(db_err)? else {
            return Ok(None);
        };

        Ok(Some(Property {
            id: row.get(0).map_err(db_err)?,
            name: row.get(1).map_err(db_err)?,
            address: Address {
                street: row.get(2).map_err(db_err)?,
                city: row.get(3).map_err(db_err)?,
                state: row.get(4).map_err(db_err)?,
                zip: row.get(5).map_err(db_err)?,
            },
            account_id: row.get(6).map_err(db_err)?,
            estimated_sqft: row.get(7).map_err(db_err)?,
            source_lead_id: row.get(8).map_err(db_err)?,
            created_at: row.get(9).map_err(db_err)?,
        }))
    }

    /// Follow-up tasks created for a lead, oldest first
    pub async fn tasks_for_lead(&self, lead_id: LeadId) -> DomainResult<Vec<FollowUpTask>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT id, title, notes, due_date, priority, status, lead_id, account_id, property_id, prospect_id, created_at FROM tasks WHERE lead_id = ?1 ORDER BY id")
            .map_err(db_err)?;
        let rows = stmt.query_map(params![lead_id], row_to_task).map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    pub async fn count_prospects_for_lead(&self, lead_id: LeadId) -> DomainResult<i64> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT COUNT(*) FROM prospects WHERE source_lead_id = ?1",
            params![lead_id],
            |row| row.get(0),
        )
        .map_err(db_err)
    }
}

#[async_trait]
impl ProspectService for CrmRepository {
    async fn create_prospect(&self, prospect: &NewProspect) -> DomainResult<Prospect> {
        let conn = self.conn.lock().await;
        let now = now_millis();
        let tags = serde_json::to_string(&prospect.tags)
            .map_err(|e| DomainError::Transport(e.to_string()))?;

        conn.execute(
            "INSERT INTO prospects (name, street, city, state, zip, notes, tags, status, source_lead_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                prospect.name,
                prospect.address.street,
                prospect.address.city,
                prospect.address.state,
                prospect.address.zip,
                prospect.notes,
                tags,
                prospect.status,
                prospect.source_lead_id,
                now
            ],
        )
        .map_err(db_err)?;

        Ok(Prospect {
            id: conn.last_insert_rowid(),
            name: prospect.name.clone(),
            address: prospect.address.clone(),
            notes: prospect.notes.clone(),
            tags: prospect.tags.clone(),
            status: prospect.status.clone(),
            source_lead_id: prospect.source_lead_id,
            created_at: now,
        })
    }
}

#[async_trait]
impl PropertyService for CrmRepository {
    async fn create_property(&self, property: &NewProperty) -> DomainResult<Property> {
        let conn = self.conn.lock().await;
        let now = now_millis();

        conn.execute(
            "INSERT INTO properties (name, street, city, state, zip, account_id, estimated_sqft, source_lead_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                property.name,
                property.address.street,
                property.address.city,
                property.address.state,
                property.address.zip,
                property.account_id,
                property.estimated_sqft,
                property.source_lead_id,
                now
            ],
        )
        .map_err(db_err)?;

        Ok(Property {
            id: conn.last_insert_rowid(),
            name: property.name.clone(),
            address: property.address.clone(),
            account_id: property.account_id,
            estimated_sqft: property.estimated_sqft,
            source_lead_id: property.source_lead_id,
            created_at: now,
        })
    }
}

#[async_trait]
impl TaskService for CrmRepository {
    async fn create_task(&self, task: &NewTask) -> DomainResult<FollowUpTask> {
        let conn = self.conn.lock().await;
        let now = now_millis();

        conn.execute(
            "INSERT INTO tasks (title, notes, due_date, priority, status, lead_id, account_id, property_id, prospect_id, created_at) VALUES (?1, ?2, ?3, ?4, 'open', ?5, ?6, ?7, ?8, ?9)",
            params![
                task.title,
                task.notes,
                task.due_date.to_rfc3339(),
                task.priority.as_str(),
                task.lead_id,
                task.account_id,
                task.property_id,
                task.prospect_id,
                now
            ],
        )
        .map_err(db_err)?;

        Ok(FollowUpTask {
            id: conn.last_insert_rowid(),
            title: task.title.clone(),
            notes: task.notes.clone(),
            due_date: task.due_date,
            priority: task.priority,
            status: "open".to_string(),
            lead_id: task.lead_id,
            account_id: task.account_id,
            property_id: task.property_id,
            prospect_id: task.prospect_id,
            created_at: now,
        })
    }
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<FollowUpTask> {
    let due_raw: String = row.get(3)?;
    let due_date = DateTime::parse_from_rfc3339(&due_raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(FollowUpTask {
        id: row.get(0)?,
        title: row.get(1)?,
        notes: row.get(2)?,
        due_date,
        priority: TaskPriority::from_str(&row.get::<_, String>(4)?),
        status: row.get(5)?,
        lead_id: row.get(6)?,
        account_id: row.get(7)?,
        property_id: row.get(8)?,
        prospect_id: row.get(9)?,
        created_at: row.get(10)?,
    })
}
