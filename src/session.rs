//! Map Session
//!
//! One session per map instance. It owns the drawing controller, the
//! viewport query engine and the lead store, receives map notifications
//! through [`MapEvents`] and keeps the store in step with lead edits.

use std::sync::Arc;

use async_trait::async_trait;

use crate::commands::{self, CreateLeadArgs};
use crate::conversion::{PropertyConversion, ProspectConversion};
use crate::domain::{
    BBox, Coordinate, DomainResult, FilterPatch, FollowUpOptions, FollowUpTask, Geometry, Lead,
    LeadDetail, LeadId, LeadImageView, LeadPatch,
};
use crate::drawing::{DrawMode, DrawingController};
use crate::query::{
    EngineOptions, LeadSource, LeadStore, QueryOutcome, QueryStatus, ViewportQueryEngine,
};
use crate::AppState;

/// Notifications from the map renderer
#[async_trait]
pub trait MapEvents {
    /// Viewport settled after a pan or zoom
    async fn on_bbox_settled(&mut self, bbox: BBox) -> DomainResult<QueryOutcome>;

    /// Single click; returns a finished geometry when the click completes one
    fn on_map_click(&mut self, coordinate: Coordinate) -> Option<Geometry>;

    fn on_double_click(&mut self) -> Option<Geometry>;

    fn on_cancel_key(&mut self);
}

pub struct MapSession {
    state: Arc<AppState>,
    drawing: DrawingController,
    engine: ViewportQueryEngine,
}

impl MapSession {
    pub fn new(state: Arc<AppState>) -> Self {
        let source: Arc<dyn LeadSource> = state.leads.clone();
        let options = EngineOptions {
            search_debounce: state.config.search_debounce(),
            page_size: state.config.page_size,
        };
        let engine = ViewportQueryEngine::new(source, LeadStore::new(), options);
        Self {
            state,
            drawing: DrawingController::new(),
            engine,
        }
    }

    pub fn drawing(&self) -> &DrawingController {
        &self.drawing
    }

    pub fn engine(&self) -> &ViewportQueryEngine {
        &self.engine
    }

    pub fn store(&self) -> &LeadStore {
        self.engine.store()
    }

    pub fn status(&self) -> tokio::sync::watch::Receiver<QueryStatus> {
        self.engine.status()
    }

    pub fn start_drawing(&mut self, mode: DrawMode) {
        self.drawing.start(mode);
    }

    /// Explicit finish action; gate it on `drawing().can_finish()`
    pub fn finish_drawing(&mut self) -> Option<Geometry> {
        self.drawing.finish()
    }

    pub fn cancel_drawing(&mut self) {
        self.drawing.cancel();
    }

    /// Drop the spatial constraint
    pub async fn clear_bbox(&self) -> DomainResult<QueryOutcome> {
        self.engine.set_bbox(None).await
    }

    pub async fn set_filters(&self, patch: FilterPatch) -> DomainResult<QueryOutcome> {
        self.engine.set_filters(patch).await
    }

    pub async fn load_more(&self) -> DomainResult<QueryOutcome> {
        self.engine.load_more().await
    }

    /// Persist a lead (usually from a finished drawing) and refresh the view
    pub async fn create_lead(&self, args: CreateLeadArgs) -> DomainResult<LeadId> {
        let created = commands::create_lead(&self.state, args).await.into_result()?;
        if let Err(e) = self.engine.refresh().await {
            log::warn!("Refresh after creating lead {} failed: {}", created.id, e);
        }
        Ok(created.id)
    }

    /// Load a lead's detail and make it the selection
    pub async fn select_lead(&self, id: LeadId) -> DomainResult<LeadDetail> {
        let detail = commands::get_lead(&self.state, id).await.into_result()?;
        self.store().select(detail.clone()).await;
        Ok(detail)
    }

    pub async fn clear_selection(&self) {
        self.store().clear_selection().await;
    }

    pub async fn update_lead(&self, id: LeadId, patch: LeadPatch) -> DomainResult<Lead> {
        let lead = commands::update_lead(&self.state, id, patch).await.into_result()?;
        self.store().patch_lead(lead.clone()).await;
        Ok(lead)
    }

    pub async fn update_lead_geometry(&self, id: LeadId, geometry: Geometry) -> DomainResult<Lead> {
        let lead = commands::update_lead_geometry(&self.state, id, geometry)
            .await
            .into_result()?;
        self.store().patch_lead(lead.clone()).await;
        Ok(lead)
    }

    pub async fn delete_lead(&self, id: LeadId) -> DomainResult<()> {
        commands::delete_lead(&self.state, id).await.into_result()?;
        self.store().remove_lead(id).await;
        Ok(())
    }

    pub async fn convert_to_prospect(&self, id: LeadId) -> DomainResult<ProspectConversion> {
        let result = commands::convert_to_prospect(&self.state, id).await.into_result()?;
        self.store().patch_lead(result.lead.clone()).await;
        Ok(result)
    }

    pub async fn create_property_from_lead(
        &self,
        id: LeadId,
        account_id: Option<i64>,
    ) -> DomainResult<PropertyConversion> {
        let result = commands::create_property_from_lead(&self.state, id, account_id)
            .await
            .into_result()?;
        self.store().patch_lead(result.lead.clone()).await;
        Ok(result)
    }

    pub async fn create_follow_up_task(
        &self,
        id: LeadId,
        options: FollowUpOptions,
    ) -> DomainResult<FollowUpTask> {
        commands::create_follow_up_task(&self.state, id, options)
            .await
            .into_result()
    }

    pub async fn upload_image(
        &self,
        lead_id: LeadId,
        file_name: String,
        bytes: Vec<u8>,
        description: Option<String>,
    ) -> DomainResult<LeadImageView> {
        let view = commands::upload_lead_image(&self.state, lead_id, file_name, bytes, description)
            .await
            .into_result()?;
        self.reload_selection(lead_id).await;
        Ok(view)
    }

    pub async fn delete_image(&self, lead_id: LeadId, image_id: i64) -> DomainResult<()> {
        commands::delete_lead_image(&self.state, lead_id, image_id)
            .await
            .into_result()?;
        self.reload_selection(lead_id).await;
        Ok(())
    }

    async fn reload_selection(&self, lead_id: LeadId) {
        let selected = self.store().selected().await;
        if selected.is_some_and(|detail| detail.lead.id == lead_id) {
            if let Err(e) = self.select_lead(lead_id).await {
                log::warn!("Failed to reload lead {}: {}", lead_id, e);
            }
        }
    }
}

#[async_trait]
impl MapEvents for MapSession {
    async fn on_bbox_settled(&mut self, bbox: BBox) -> DomainResult<QueryOutcome> {
        self.engine.set_bbox(Some(bbox)).await
    }

    fn on_map_click(&mut self, coordinate: Coordinate) -> Option<Geometry> {
        self.drawing.click(coordinate)
    }

    fn on_double_click(&mut self) -> Option<Geometry> {
        self.drawing.finish()
    }

    fn on_cancel_key(&mut self) {
        self.drawing.cancel();
    }
}
