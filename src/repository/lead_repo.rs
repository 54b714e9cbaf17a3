//! Lead Repository
//!
//! SQLite-backed implementation for Lead CRUD, spatial listing and the
//! write-once conversion links. Geometry is stored as position-only text
//! (see [`crate::codec`]) next to its bounding box columns, which carry the
//! spatial filter.

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::codec;
use crate::domain::{
    Address, ConditionLabel, DomainError, DomainResult, Geometry, Lead, LeadId, LeadQuery,
    LeadStatus,
};
use crate::query::LeadSource;
use super::db::now_millis;
use super::traits::Repository;
use super::db_err;

const LEAD_COLUMNS: &str = "id, name, geometry, condition_label, condition_score, status, notes, \
     street, city, state, zip, estimated_sqft, estimated_repair_cost, linked_prospect_id, \
     linked_account_id, linked_property_id, created_by, created_at, updated_at";

/// SQLite implementation of Lead repository
pub struct LeadRepository {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl LeadRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Leads intersecting the bbox and matching the filters, newest first
    pub async fn query(&self, query: &LeadQuery) -> DomainResult<Vec<Lead>> {
        query.filters.validate()?;

        let mut sql = format!("SELECT {} FROM leads WHERE 1 = 1", LEAD_COLUMNS);
        let mut values: Vec<Value> = Vec::new();

        if let Some(bbox) = &query.bbox {
            // Rows with undecodable geometry have NULL bounds and never match
            sql.push_str(" AND max_lng >= ? AND min_lng <= ? AND max_lat >= ? AND min_lat <= ?");
            values.push(Value::Real(bbox.min_lng));
            values.push(Value::Real(bbox.max_lng));
            values.push(Value::Real(bbox.min_lat));
            values.push(Value::Real(bbox.max_lat));
        }

        let search = query.filters.search.trim();
        if !search.is_empty() {
            let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
            sql.push_str(" AND (");
            let columns = ["name", "notes", "street", "city", "zip"];
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    sql.push_str(" OR ");
                }
                sql.push_str(&format!("lower(COALESCE({}, '')) LIKE ? ESCAPE '\\'", column));
                values.push(Value::Text(pattern.clone()));
            }
            sql.push(')');
        }

        if let Some(status) = query.filters.status {
            sql.push_str(" AND status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(label) = query.filters.condition_label {
            sql.push_str(" AND condition_label = ?");
            values.push(Value::Text(label.as_str().to_string()));
        }
        if let Some(min) = query.filters.min_score {
            sql.push_str(" AND condition_score >= ?");
            values.push(Value::Integer(min as i64));
        }
        if let Some(max) = query.filters.max_score {
            sql.push_str(" AND condition_score <= ?");
            values.push(Value::Integer(max as i64));
        }

        let tags = crate::domain::normalize_tags(&query.filters.tags);
        if !tags.is_empty() {
            let placeholders = vec!["?"; tags.len()].join(", ");
            sql.push_str(&format!(
                " AND id IN (SELECT lead_id FROM lead_tags WHERE tag IN ({}) \
                 GROUP BY lead_id HAVING COUNT(DISTINCT tag) = ?)",
                placeholders
            ));
            for tag in &tags {
                values.push(Value::Text(tag.clone()));
            }
            values.push(Value::Integer(tags.len() as i64));
        }

        sql.push_str(" ORDER BY updated_at DESC, id DESC LIMIT ? OFFSET ?");
        values.push(Value::Integer(query.limit.max(1) as i64));
        values.push(Value::Integer(query.offset as i64));

        let conn = self.conn.lock().await;
        let mut leads = {
            let mut stmt = conn.prepare(&sql).map_err(db_err)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), row_to_lead)
                .map_err(db_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(db_err)?
        };
        attach_tags(&conn, &mut leads)?;

        log::debug!("Lead query matched {} rows", leads.len());
        Ok(leads)
    }

    /// Replace the geometry of a lead, keeping its shape kind
    pub async fn update_geometry(&self, id: LeadId, geometry: Geometry) -> DomainResult<Lead> {
        let conn = self.conn.lock().await;

        let mut lead = find_lead(&conn, id)?
            .ok_or_else(|| DomainError::NotFound(format!("Lead {} not found", id)))?;
        lead.replace_geometry(geometry.clone())?;

        let bounds = geometry.bounds();
        conn.execute(
            "UPDATE leads SET geometry = ?1, min_lng = ?2, min_lat = ?3, max_lng = ?4, max_lat = ?5, updated_at = ?6 WHERE id = ?7",
            params![
                codec::encode(&geometry),
                bounds.min_lng,
                bounds.min_lat,
                bounds.max_lng,
                bounds.max_lat,
                now_millis(),
                id
            ],
        )
        .map_err(db_err)?;

        find_lead(&conn, id)?.ok_or_else(|| DomainError::NotFound(format!("Lead {} not found", id)))
    }

    /// Record the prospect a lead was converted into
    ///
    /// Succeeds only while no prospect is linked yet; also marks the lead converted.
    pub async fn link_prospect(&self, id: LeadId, prospect_id: i64) -> DomainResult<Lead> {
        let conn = self.conn.lock().await;

        let changed = conn
            .execute(
                "UPDATE leads SET linked_prospect_id = ?1, status = ?2, updated_at = ?3 WHERE id = ?4 AND linked_prospect_id IS NULL AND status != 'rejected'",
                params![prospect_id, LeadStatus::Converted.as_str(), now_millis(), id],
            )
            .map_err(db_err)?;

        if changed == 0 {
            return Err(link_failure(&conn, id, "prospect", |lead| lead.linked_prospect_id)?);
        }
        find_lead(&conn, id)?.ok_or_else(|| DomainError::NotFound(format!("Lead {} not found", id)))
    }

    /// Record the property created from a lead, adopting `account_id` when the lead has none
    pub async fn link_property(
        &self,
        id: LeadId,
        property_id: i64,
        account_id: Option<i64>,
    ) -> DomainResult<Lead> {
        let conn = self.conn.lock().await;

        let changed = conn
            .execute(
                "UPDATE leads SET linked_property_id = ?1, linked_account_id = COALESCE(linked_account_id, ?2), status = ?3, updated_at = ?4 WHERE id = ?5 AND linked_property_id IS NULL AND status != 'rejected'",
                params![property_id, account_id, LeadStatus::Converted.as_str(), now_millis(), id],
            )
            .map_err(db_err)?;

        if changed == 0 {
            return Err(link_failure(&conn, id, "property", |lead| lead.linked_property_id)?);
        }
        find_lead(&conn, id)?.ok_or_else(|| DomainError::NotFound(format!("Lead {} not found", id)))
    }
}

#[async_trait]
impl Repository<Lead> for LeadRepository {
    async fn create(&self, entity: &Lead) -> DomainResult<Lead> {
        entity.validate()?;
        if entity.status == LeadStatus::Converted {
            return Err(DomainError::Validation(
                "Status 'converted' is set by conversion only".into(),
            ));
        }
        let geometry = entity
            .geometry
            .as_ref()
            .ok_or_else(|| DomainError::Validation("Lead geometry is required".into()))?;
        let bounds = geometry.bounds();
        let now = now_millis();

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute(
            "INSERT INTO leads (name, geometry, min_lng, min_lat, max_lng, max_lat, condition_label, condition_score, status, notes, street, city, state, zip, estimated_sqft, estimated_repair_cost, linked_prospect_id, linked_account_id, linked_property_id, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?21)",
            params![
                entity.name.trim(),
                codec::encode(geometry),
                bounds.min_lng,
                bounds.min_lat,
                bounds.max_lng,
                bounds.max_lat,
                entity.condition_label.as_str(),
                entity.condition_score,
                entity.status.as_str(),
                entity.notes,
                entity.address.street,
                entity.address.city,
                entity.address.state,
                entity.address.zip,
                entity.estimated_sqft,
                entity.estimated_repair_cost,
                entity.linked_prospect_id,
                entity.linked_account_id,
                entity.linked_property_id,
                entity.created_by,
                now,
            ],
        )
        .map_err(db_err)?;
        let id = tx.last_insert_rowid();
        write_tags(&tx, id, &entity.tags)?;
        tx.commit().map_err(db_err)?;

        log::info!("Created lead {} ({})", id, geometry.kind().as_str());
        find_lead(&conn, id)?
            .ok_or_else(|| DomainError::Transport(format!("Lead {} missing after insert", id)))
    }

    async fn find_by_id(&self, id: LeadId) -> DomainResult<Option<Lead>> {
        let conn = self.conn.lock().await;
        find_lead(&conn, id)
    }

    async fn list(&self) -> DomainResult<Vec<Lead>> {
        let conn = self.conn.lock().await;

        let mut leads = {
            let mut stmt = conn
                .prepare(&format!("SELECT {} FROM leads ORDER BY updated_at DESC, id DESC", LEAD_COLUMNS))
                .map_err(db_err)?;
            let rows = stmt.query_map([], row_to_lead).map_err(db_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(db_err)?
        };
        attach_tags(&conn, &mut leads)?;
        Ok(leads)
    }

    async fn update(&self, entity: &Lead) -> DomainResult<Lead> {
        // Geometry goes through update_geometry; a lead whose stored geometry
        // no longer decodes can still have its metadata edited.
        entity.validate_metadata()?;

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(db_err)?;
        let changed = tx
            .execute(
                "UPDATE leads SET name = ?1, condition_label = ?2, condition_score = ?3, status = CASE WHEN status = 'converted' THEN status ELSE ?4 END, notes = ?5, street = ?6, city = ?7, state = ?8, zip = ?9, estimated_sqft = ?10, estimated_repair_cost = ?11,
                 linked_prospect_id = COALESCE(linked_prospect_id, ?12), linked_account_id = ?13, linked_property_id = COALESCE(linked_property_id, ?14), updated_at = ?15
                 WHERE id = ?16",
                params![
                    entity.name.trim(),
                    entity.condition_label.as_str(),
                    entity.condition_score,
                    entity.status.as_str(),
                    entity.notes,
                    entity.address.street,
                    entity.address.city,
                    entity.address.state,
                    entity.address.zip,
                    entity.estimated_sqft,
                    entity.estimated_repair_cost,
                    entity.linked_prospect_id,
                    entity.linked_account_id,
                    entity.linked_property_id,
                    now_millis(),
                    entity.id,
                ],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(DomainError::NotFound(format!("Lead {} not found", entity.id)));
        }
        write_tags(&tx, entity.id, &entity.tags)?;
        tx.commit().map_err(db_err)?;

        find_lead(&conn, entity.id)?
            .ok_or_else(|| DomainError::NotFound(format!("Lead {} not found", entity.id)))
    }

    async fn delete(&self, id: LeadId) -> DomainResult<()> {
        let conn = self.conn.lock().await;

        // Tags and image rows go with it (ON DELETE CASCADE)
        let changed = conn
            .execute("DELETE FROM leads WHERE id = ?1", params![id])
            .map_err(db_err)?;
        if changed == 0 {
            return Err(DomainError::NotFound(format!("Lead {} not found", id)));
        }
        log::info!("Deleted lead {}", id);
        Ok(())
    }
}

#[async_trait]
impl LeadSource for LeadRepository {
    async fn fetch(&self, query: &LeadQuery) -> DomainResult<Vec<Lead>> {
        self.query(query).await
    }
}

pub(crate) fn find_lead(conn: &Connection, id: LeadId) -> DomainResult<Option<Lead>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {} FROM leads WHERE id = ?1", LEAD_COLUMNS))
        .map_err(db_err)?;
    let mut rows = stmt.query(params![id]).map_err(db_err)?;

    match rows.next().map_err(db_err)? {
        Some(row) => {
            let mut lead = row_to_lead(row).map_err(db_err)?;
            lead.tags = load_tags(conn, id)?;
            Ok(Some(lead))
        }
        None => Ok(None),
    }
}

/// Convert a database row to Lead (tags are attached separately)
fn row_to_lead(row: &rusqlite::Row) -> rusqlite::Result<Lead> {
    let id: LeadId = row.get(0)?;
    let raw_geometry: String = row.get(2)?;
    let geometry = match codec::try_decode(&raw_geometry) {
        Ok(geometry) => Some(geometry),
        Err(e) => {
            log::warn!("Lead {} has no map marker: {}", id, e);
            None
        }
    };

    Ok(Lead {
        id,
        name: row.get(1)?,
        geometry,
        condition_label: ConditionLabel::from_str(&row.get::<_, String>(3)?),
        condition_score: row.get(4)?,
        status: LeadStatus::from_str(&row.get::<_, String>(5)?),
        tags: BTreeSet::new(),
        notes: row.get(6)?,
        address: Address {
            street: row.get(7)?,
            city: row.get(8)?,
            state: row.get(9)?,
            zip: row.get(10)?,
        },
        estimated_sqft: row.get(11)?,
        estimated_repair_cost: row.get(12)?,
        linked_prospect_id: row.get(13)?,
        linked_account_id: row.get(14)?,
        linked_property_id: row.get(15)?,
        created_by: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
    })
}

fn load_tags(conn: &Connection, id: LeadId) -> DomainResult<BTreeSet<String>> {
    let mut stmt = conn
        .prepare("SELECT tag FROM lead_tags WHERE lead_id = ?1")
        .map_err(db_err)?;
    let rows = stmt
        .query_map(params![id], |row| row.get::<_, String>(0))
        .map_err(db_err)?;
    rows.collect::<Result<BTreeSet<_>, _>>().map_err(db_err)
}

/// Fill in tags for a page of leads with one query
fn attach_tags(conn: &Connection, leads: &mut [Lead]) -> DomainResult<()> {
    if leads.is_empty() {
        return Ok(());
    }
    let ids: Vec<LeadId> = leads.iter().map(|lead| lead.id).collect();
    let placeholders = vec!["?"; ids.len()].join(", ");
    let mut stmt = conn
        .prepare(&format!(
            "SELECT lead_id, tag FROM lead_tags WHERE lead_id IN ({})",
            placeholders
        ))
        .map_err(db_err)?;
    let rows = stmt
        .query_map(params_from_iter(ids.iter()), |row| {
            Ok((row.get::<_, LeadId>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(db_err)?;

    let mut by_lead: HashMap<LeadId, BTreeSet<String>> = HashMap::new();
    for row in rows {
        let (lead_id, tag) = row.map_err(db_err)?;
        by_lead.entry(lead_id).or_default().insert(tag);
    }
    for lead in leads.iter_mut() {
        if let Some(tags) = by_lead.remove(&lead.id) {
            lead.tags = tags;
        }
    }
    Ok(())
}

fn write_tags(conn: &Connection, id: LeadId, tags: &BTreeSet<String>) -> DomainResult<()> {
    conn.execute("DELETE FROM lead_tags WHERE lead_id = ?1", params![id])
        .map_err(db_err)?;
    for tag in tags {
        conn.execute(
            "INSERT OR IGNORE INTO lead_tags (lead_id, tag) VALUES (?1, ?2)",
            params![id, tag],
        )
        .map_err(db_err)?;
    }
    Ok(())
}

/// Explain why a guarded link update touched no row
fn link_failure(
    conn: &Connection,
    id: LeadId,
    target: &str,
    current: impl Fn(&Lead) -> Option<i64>,
) -> DomainResult<DomainError> {
    Ok(match find_lead(conn, id)? {
        None => DomainError::NotFound(format!("Lead {} not found", id)),
        Some(lead) if lead.status == LeadStatus::Rejected => {
            DomainError::Validation(format!("Lead {} was rejected and cannot be linked", id))
        }
        Some(lead) => DomainError::Conflict(format!(
            "Lead {} is already linked to {} {}",
            id,
            target,
            current(&lead).unwrap_or_default()
        )),
    })
}

/// Escape `%`, `_` and `\` for a LIKE pattern using `ESCAPE '\'`
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
