//! Commands for Lead images

use std::path::PathBuf;

use crate::domain::{LeadId, LeadImageView};
use crate::AppState;
use super::CommandResult;

/// Attach a photo; the response carries a time-limited signed URL
pub async fn upload_lead_image(
    state: &AppState,
    lead_id: LeadId,
    file_name: String,
    bytes: Vec<u8>,
    description: Option<String>,
) -> CommandResult<LeadImageView> {
    state
        .images
        .upload(lead_id, &file_name, bytes, description)
        .await
        .into()
}

pub async fn list_lead_images(state: &AppState, lead_id: LeadId) -> CommandResult<Vec<LeadImageView>> {
    state.images.list(lead_id).await.into()
}

pub async fn delete_lead_image(state: &AppState, lead_id: LeadId, image_id: i64) -> CommandResult<()> {
    state.images.delete(lead_id, image_id).await.into()
}

/// Map a `lead-image://` URL to the file it grants access to
pub fn resolve_image_url(state: &AppState, url: &str) -> CommandResult<PathBuf> {
    state.images.resolve_signed_url(url).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Geometry, Lead};
    use crate::repository::Repository;
    use crate::testing::test_state;

    #[tokio::test]
    async fn test_upload_list_resolve_delete() {
        let (_dir, state) = test_state().await;
        let lead = state
            .leads
            .create(&Lead::new(0, "Roof".into(), Geometry::point(-95.0, 29.0)))
            .await
            .unwrap();

        let view = upload_lead_image(&state, lead.id, "north.jpeg".into(), b"img".to_vec(), None)
            .await
            .into_result()
            .unwrap();
        assert_eq!(list_lead_images(&state, lead.id).await.into_result().unwrap().len(), 1);

        let path = resolve_image_url(&state, &view.signed_url.url).into_result().unwrap();
        assert!(path.exists());

        let result = delete_lead_image(&state, lead.id + 1, view.image.id).await;
        assert_eq!(result.error_kind(), Some("ReferenceError"));
        assert!(delete_lead_image(&state, lead.id, view.image.id).await.success);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_rejections_are_results() {
        let (_dir, state) = test_state().await;
        let result = upload_lead_image(&state, 1, "a.png".into(), b"img".to_vec(), None).await;
        assert_eq!(result.error_kind(), Some("ReferenceError"));
        assert_eq!(resolve_image_url(&state, "lead-image://x").error_kind(), Some("ValidationError"));
    }
}
