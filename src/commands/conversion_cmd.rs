//! Commands for the Conversion Workflow

use crate::conversion::{PropertyConversion, ProspectConversion};
use crate::domain::{FollowUpOptions, FollowUpTask, LeadId};
use crate::AppState;
use super::CommandResult;

pub async fn convert_to_prospect(state: &AppState, lead_id: LeadId) -> CommandResult<ProspectConversion> {
    state.conversion.convert_to_prospect(lead_id).await.into()
}

pub async fn create_property_from_lead(
    state: &AppState,
    lead_id: LeadId,
    account_id: Option<i64>,
) -> CommandResult<PropertyConversion> {
    state
        .conversion
        .create_property_from_lead(lead_id, account_id)
        .await
        .into()
}

pub async fn create_follow_up_task(
    state: &AppState,
    lead_id: LeadId,
    options: FollowUpOptions,
) -> CommandResult<FollowUpTask> {
    state.conversion.create_follow_up_task(lead_id, options).await.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Geometry, Lead};
    use crate::repository::Repository;
    use crate::testing::test_state;

    #[tokio::test]
    async fn test_already_linked_lead_conflicts() {
        let (_dir, state) = test_state().await;
        let mut lead = Lead::new(0, "Linked".into(), Geometry::point(-95.0, 29.0));
        lead.linked_prospect_id = Some(42);
        let lead = state.leads.create(&lead).await.unwrap();

        let result = convert_to_prospect(&state, lead.id).await;
        assert!(!result.success);
        assert_eq!(result.error_kind(), Some("ConflictError"));
    }

    #[tokio::test]
    async fn test_follow_up_without_due_date_fails() {
        let (_dir, state) = test_state().await;
        let lead = state
            .leads
            .create(&Lead::new(0, "Roof".into(), Geometry::point(-95.0, 29.0)))
            .await
            .unwrap();

        let options: FollowUpOptions = serde_json::from_str("{}").unwrap();
        let result = create_follow_up_task(&state, lead.id, options).await;
        assert!(!result.success);
        assert_eq!(result.error_kind(), Some("ValidationError"));
    }

    #[tokio::test]
    async fn test_property_conversion_round_trip() {
        let (_dir, state) = test_state().await;
        let lead = state
            .leads
            .create(&Lead::new(0, "Roof".into(), Geometry::point(-95.0, 29.0)))
            .await
            .unwrap();

        let converted = create_property_from_lead(&state, lead.id, Some(3)).await.into_result().unwrap();
        assert_eq!(converted.lead.linked_property_id, Some(converted.property.id));
        let again = create_property_from_lead(&state, lead.id, None).await;
        assert_eq!(again.error_kind(), Some("ConflictError"));
    }
}
