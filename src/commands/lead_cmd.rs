//! Commands for Lead operations
//!
//! Listing, CRUD and geometry edits.

use serde::{Deserialize, Serialize};

use crate::domain::{
    normalize_tags, Address, BBox, ConditionLabel, DomainError, DomainResult, Geometry, Lead,
    LeadDetail, LeadFilters, LeadId, LeadPatch, LeadQuery, LeadStatus,
};
use crate::repository::Repository;
use crate::AppState;
use super::CommandResult;

/// List request: `{bbox, search, status?, tags?, minScore?, maxScore?, limit, offset}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListLeadsArgs {
    /// `[minLng, minLat, maxLng, maxLat]`; `null` is unbounded
    pub bbox: Option<[f64; 4]>,
    pub search: String,
    pub status: Option<LeadStatus>,
    #[serde(rename = "conditionLabel")]
    pub condition_label: Option<ConditionLabel>,
    pub tags: Vec<String>,
    #[serde(rename = "minScore")]
    pub min_score: Option<u8>,
    #[serde(rename = "maxScore")]
    pub max_score: Option<u8>,
    pub limit: Option<u32>,
    pub offset: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateLeadArgs {
    pub name: String,
    pub geometry: Option<Geometry>,
    #[serde(rename = "conditionLabel")]
    pub condition_label: Option<ConditionLabel>,
    #[serde(rename = "conditionScore")]
    pub condition_score: Option<u8>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    #[serde(flatten)]
    pub address: Address,
    #[serde(rename = "estimatedSqft")]
    pub estimated_sqft: Option<f64>,
    #[serde(rename = "estimatedRepairCost")]
    pub estimated_repair_cost: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedLead {
    pub id: LeadId,
}

/// Leads matching filters inside a bbox, newest first
pub async fn list_leads(state: &AppState, args: ListLeadsArgs) -> CommandResult<Vec<Lead>> {
    run_list(state, args).await.into()
}

async fn run_list(state: &AppState, args: ListLeadsArgs) -> DomainResult<Vec<Lead>> {
    let bbox = args.bbox.map(BBox::try_from).transpose()?;
    let filters = LeadFilters {
        search: args.search,
        status: args.status,
        condition_label: args.condition_label,
        tags: args.tags,
        min_score: args.min_score,
        max_score: args.max_score,
    };
    filters.validate()?;

    let mut query = LeadQuery::new(bbox, filters, state.config.clamp_limit(args.limit));
    query.offset = args.offset;
    state.leads.query(&query).await
}

/// Lead with its images and fresh signed URLs
pub async fn get_lead(state: &AppState, id: LeadId) -> CommandResult<LeadDetail> {
    async {
        let lead = state
            .leads
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("Lead {} not found", id)))?;
        let images = state.images.list(id).await?;
        Ok::<_, DomainError>(LeadDetail { lead, images })
    }
    .await
    .into()
}

pub async fn create_lead(state: &AppState, args: CreateLeadArgs) -> CommandResult<CreatedLead> {
    async {
        let name = args.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::Validation("Lead name is required".into()));
        }
        let geometry = args
            .geometry
            .ok_or_else(|| DomainError::Validation("Lead geometry is required".into()))?;

        let mut lead = Lead::new(0, name, geometry);
        lead.condition_label = args.condition_label.unwrap_or_default();
        if let Some(score) = args.condition_score {
            lead.condition_score = score;
        }
        lead.tags = normalize_tags(&args.tags);
        lead.notes = args.notes.filter(|n| !n.trim().is_empty());
        lead.address = args.address;
        lead.estimated_sqft = args.estimated_sqft;
        lead.estimated_repair_cost = args.estimated_repair_cost;
        lead.created_by = state.config.current_user.clone();

        let created = state.leads.create(&lead).await?;
        Ok(CreatedLead { id: created.id })
    }
    .await
    .into()
}

/// Whitelisted partial update
pub async fn update_lead(state: &AppState, id: LeadId, patch: LeadPatch) -> CommandResult<Lead> {
    async {
        let mut lead = state
            .leads
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("Lead {} not found", id)))?;
        lead.apply_patch(patch)?;
        state.leads.update(&lead).await
    }
    .await
    .into()
}

/// Replace a lead's geometry (vertex editing); the shape kind cannot change
pub async fn update_lead_geometry(
    state: &AppState,
    id: LeadId,
    geometry: Geometry,
) -> CommandResult<Lead> {
    state.leads.update_geometry(id, geometry).await.into()
}

/// Delete a lead together with its images
pub async fn delete_lead(state: &AppState, id: LeadId) -> CommandResult<()> {
    async {
        if state.leads.find_by_id(id).await?.is_none() {
            return Err(DomainError::NotFound(format!("Lead {} not found", id)));
        }
        let removed = state.images.delete_all_for_lead(id).await?;
        state.leads.delete(id).await?;
        log::info!("Deleted lead {} with {} images", id, removed);
        Ok(())
    }
    .await
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_state;

    fn point_args(name: &str, lng: f64, lat: f64) -> CreateLeadArgs {
        CreateLeadArgs {
            name: name.to_string(),
            geometry: Some(Geometry::point(lng, lat)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_requires_name_and_geometry() {
        let (_dir, state) = test_state().await;

        let result = create_lead(&state, point_args("  ", -95.0, 29.0)).await;
        assert_eq!(result.error_kind(), Some("ValidationError"));

        let result = create_lead(
            &state,
            CreateLeadArgs {
                name: "No shape".into(),
                ..Default::default()
            },
        )
        .await;
        assert_eq!(result.error_kind(), Some("ValidationError"));

        let result = create_lead(
            &state,
            CreateLeadArgs {
                condition_score: Some(6),
                ..point_args("Bad score", -95.0, 29.0)
            },
        )
        .await;
        assert_eq!(result.error_kind(), Some("ValidationError"));
    }

    #[tokio::test]
    async fn test_create_from_wire_args() {
        let (_dir, state) = test_state().await;
        let args: CreateLeadArgs = serde_json::from_value(serde_json::json!({
            "name": "Strip mall",
            "geometry": {"type": "Point", "coordinates": [-95.37, 29.76]},
            "conditionLabel": "aged",
            "conditionScore": 4,
            "tags": [" flat ", ""],
            "city": "Houston"
        }))
        .unwrap();

        let id = create_lead(&state, args).await.into_result().unwrap().id;
        let detail = get_lead(&state, id).await.into_result().unwrap();
        assert_eq!(detail.lead.condition_label, ConditionLabel::Aged);
        assert_eq!(detail.lead.condition_score, 4);
        assert_eq!(detail.lead.tags.iter().collect::<Vec<_>>(), vec!["flat"]);
        assert_eq!(detail.lead.address.city.as_deref(), Some("Houston"));
        assert_eq!(detail.lead.created_by, "tester");
        assert!(detail.images.is_empty());
    }

    #[tokio::test]
    async fn test_list_clamps_limit_and_rejects_bad_bbox() {
        let (_dir, state) = test_state().await;
        for i in 0..3 {
            create_lead(&state, point_args(&format!("L{}", i), -95.0, 29.0)).await;
        }

        let args = ListLeadsArgs {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(list_leads(&state, args).await.into_result().unwrap().len(), 1);

        let args = ListLeadsArgs {
            bbox: Some([-94.0, 29.0, -96.0, 30.0]),
            ..Default::default()
        };
        assert_eq!(list_leads(&state, args).await.error_kind(), Some("ValidationError"));
    }

    #[tokio::test]
    async fn test_update_rules() {
        let (_dir, state) = test_state().await;
        let id = create_lead(&state, point_args("Roof", -95.0, 29.0)).await.into_result().unwrap().id;

        let patch = LeadPatch {
            status: Some(LeadStatus::Qualified),
            notes: Some("spoke to manager".into()),
            ..Default::default()
        };
        let lead = update_lead(&state, id, patch).await.into_result().unwrap();
        assert_eq!(lead.status, LeadStatus::Qualified);

        let patch = LeadPatch {
            status: Some(LeadStatus::Converted),
            ..Default::default()
        };
        assert_eq!(update_lead(&state, id, patch).await.error_kind(), Some("ValidationError"));

        let patch = LeadPatch {
            linked_prospect_id: Some(5),
            ..Default::default()
        };
        update_lead(&state, id, patch).await.into_result().unwrap();
        let patch = LeadPatch {
            linked_prospect_id: Some(6),
            ..Default::default()
        };
        assert_eq!(update_lead(&state, id, patch).await.error_kind(), Some("ConflictError"));

        assert_eq!(
            update_lead(&state, 999, LeadPatch::default()).await.error_kind(),
            Some("ReferenceError")
        );
    }

    #[tokio::test]
    async fn test_geometry_edit_keeps_kind() {
        let (_dir, state) = test_state().await;
        let id = create_lead(&state, point_args("Roof", -95.0, 29.0)).await.into_result().unwrap().id;

        let moved = update_lead_geometry(&state, id, Geometry::point(-95.1, 29.1)).await;
        assert_eq!(moved.into_result().unwrap().geometry, Some(Geometry::point(-95.1, 29.1)));

        let polygon: Geometry = serde_json::from_value(serde_json::json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]]
        }))
        .unwrap();
        assert_eq!(
            update_lead_geometry(&state, id, polygon).await.error_kind(),
            Some("ValidationError")
        );
    }

    #[tokio::test]
    async fn test_delete_removes_images() {
        let (_dir, state) = test_state().await;
        let id = create_lead(&state, point_args("Roof", -95.0, 29.0)).await.into_result().unwrap().id;
        let view = state.images.upload(id, "a.png", b"png".to_vec(), None).await.unwrap();
        let path = state.images.storage_dir().join(&view.image.file_ref);

        delete_lead(&state, id).await.into_result().unwrap();
        assert!(!path.exists());
        assert_eq!(get_lead(&state, id).await.error_kind(), Some("ReferenceError"));
        assert_eq!(delete_lead(&state, id).await.error_kind(), Some("ReferenceError"));
    }
}
