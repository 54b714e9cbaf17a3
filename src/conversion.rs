//! Conversion Workflow
//!
//! Promotes a lead into CRM records: a prospect, a property, or any number
//! of follow-up tasks.
//!
//! Prospect and property conversions create the record first and then link
//! it on the lead. There is no rollback: if linking fails after the record
//! was created, the record is left behind, the divergence is logged with
//! both ids and the caller gets a `Transport` error naming the orphan.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    DomainError, DomainResult, FollowUpOptions, FollowUpTask, Lead, LeadId, LeadStatus, NewProperty,
    NewProspect, NewTask, Property, Prospect, TaskPriority, CONVERSION_TAG,
    PROSPECT_STATUS_UNCONTACTED,
};
use crate::repository::{LeadRepository, Repository};

/// Creates prospects
#[async_trait]
pub trait ProspectService: Send + Sync {
    async fn create_prospect(&self, prospect: &NewProspect) -> DomainResult<Prospect>;
}

/// Creates properties
#[async_trait]
pub trait PropertyService: Send + Sync {
    async fn create_property(&self, property: &NewProperty) -> DomainResult<Property>;
}

/// Creates follow-up tasks
#[async_trait]
pub trait TaskService: Send + Sync {
    async fn create_task(&self, task: &NewTask) -> DomainResult<FollowUpTask>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProspectConversion {
    pub lead: Lead,
    pub prospect: Prospect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyConversion {
    pub lead: Lead,
    pub property: Property,
}

pub struct ConversionWorkflow {
    leads: Arc<LeadRepository>,
    prospects: Arc<dyn ProspectService>,
    properties: Arc<dyn PropertyService>,
    tasks: Arc<dyn TaskService>,
}

impl ConversionWorkflow {
    pub fn new(
        leads: Arc<LeadRepository>,
        prospects: Arc<dyn ProspectService>,
        properties: Arc<dyn PropertyService>,
        tasks: Arc<dyn TaskService>,
    ) -> Self {
        Self {
            leads,
            prospects,
            properties,
            tasks,
        }
    }

    pub async fn convert_to_prospect(&self, lead_id: LeadId) -> DomainResult<ProspectConversion> {
        let lead = self.load_convertible(lead_id).await?;
        if let Some(existing) = lead.linked_prospect_id {
            return Err(DomainError::Conflict(format!(
                "Lead {} was already converted to prospect {}",
                lead_id, existing
            )));
        }

        let prospect = self.prospects.create_prospect(&prospect_payload(&lead)).await?;
        log::info!("Created prospect {} from lead {}", prospect.id, lead_id);

        let lead = self
            .leads
            .link_prospect(lead_id, prospect.id)
            .await
            .map_err(|e| divergence("prospect", prospect.id, lead_id, e))?;

        Ok(ProspectConversion { lead, prospect })
    }

    /// `account_id` falls back to the account already linked on the lead
    pub async fn create_property_from_lead(
        &self,
        lead_id: LeadId,
        account_id: Option<i64>,
    ) -> DomainResult<PropertyConversion> {
        let lead = self.load_convertible(lead_id).await?;
        if let Some(existing) = lead.linked_property_id {
            return Err(DomainError::Conflict(format!(
                "Lead {} already has property {}",
                lead_id, existing
            )));
        }

        let account_id = account_id.or(lead.linked_account_id);
        let payload = NewProperty {
            name: lead.name.clone(),
            address: lead.address.clone(),
            account_id,
            estimated_sqft: lead.estimated_sqft,
            source_lead_id: Some(lead.id),
        };
        let property = self.properties.create_property(&payload).await?;
        log::info!("Created property {} from lead {}", property.id, lead_id);

        let lead = self
            .leads
            .link_property(lead_id, property.id, account_id)
            .await
            .map_err(|e| divergence("property", property.id, lead_id, e))?;

        Ok(PropertyConversion { lead, property })
    }

    /// Not link-exclusive: every call creates another task
    pub async fn create_follow_up_task(
        &self,
        lead_id: LeadId,
        options: FollowUpOptions,
    ) -> DomainResult<FollowUpTask> {
        let due_date = match (options.due_date, options.due_in_days) {
            (Some(date), _) => date,
            (None, Some(days)) => Utc::now()
                .checked_add_signed(Duration::days(i64::from(days)))
                .ok_or_else(|| DomainError::Validation("due_in_days out of range".into()))?,
            (None, None) => {
                return Err(DomainError::Validation(
                    "Follow-up task needs a due date or a number of days".into(),
                ))
            }
        };

        let lead = self.load(lead_id).await?;
        let task = NewTask {
            title: format!("Follow up: {}", lead.name),
            notes: options.notes,
            due_date,
            priority: options
                .priority
                .unwrap_or_else(|| TaskPriority::for_condition_score(lead.condition_score)),
            lead_id: Some(lead.id),
            account_id: lead.linked_account_id,
            property_id: lead.linked_property_id,
            prospect_id: lead.linked_prospect_id,
        };

        let task = self.tasks.create_task(&task).await?;
        log::info!("Created follow-up task {} for lead {}", task.id, lead_id);
        Ok(task)
    }

    async fn load(&self, lead_id: LeadId) -> DomainResult<Lead> {
        self.leads
            .find_by_id(lead_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("Lead {} not found", lead_id)))
    }

    /// Rejected leads never become CRM records
    async fn load_convertible(&self, lead_id: LeadId) -> DomainResult<Lead> {
        let lead = self.load(lead_id).await?;
        if lead.status == LeadStatus::Rejected {
            return Err(DomainError::Validation(format!(
                "Lead {} was rejected and cannot be converted",
                lead_id
            )));
        }
        Ok(lead)
    }
}

fn prospect_payload(lead: &Lead) -> NewProspect {
    let mut notes = vec![format!(
        "Roof condition: {} (score {}/5)",
        lead.condition_label.as_str(),
        lead.condition_score
    )];
    if let Some(sqft) = lead.estimated_sqft {
        notes.push(format!("Estimated roof area: {} sqft", sqft));
    }
    if let Some(cost) = lead.estimated_repair_cost {
        notes.push(format!("Estimated repair cost: ${:.2}", cost));
    }
    if let Some(lead_notes) = lead.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        notes.push(lead_notes.to_string());
    }

    let mut tags = lead.tags.clone();
    tags.insert(CONVERSION_TAG.to_string());

    NewProspect {
        name: lead.name.clone(),
        address: lead.address.clone(),
        notes: notes.join("\n"),
        tags,
        status: PROSPECT_STATUS_UNCONTACTED.to_string(),
        source_lead_id: Some(lead.id),
    }
}

fn divergence(target: &str, entity_id: i64, lead_id: LeadId, cause: DomainError) -> DomainError {
    log::error!(
        "Created {} {} but failed to link it to lead {}: {}",
        target,
        entity_id,
        lead_id,
        cause
    );
    DomainError::Transport(format!(
        "{} {} was created but lead {} could not be linked: {}",
        target, entity_id, lead_id, cause
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConditionLabel, Geometry};
    use crate::repository::{init_db, CrmRepository};
    use std::path::Path;

    struct Fixture {
        leads: Arc<LeadRepository>,
        crm: Arc<CrmRepository>,
        workflow: ConversionWorkflow,
    }

    async fn fixture() -> Fixture {
        let db = init_db(Path::new(":memory:")).await.unwrap();
        let leads = Arc::new(LeadRepository::new(db.conn.clone()));
        let crm = Arc::new(CrmRepository::new(db.conn.clone()));
        let workflow = ConversionWorkflow::new(leads.clone(), crm.clone(), crm.clone(), crm.clone());
        Fixture { leads, crm, workflow }
    }

    async fn seed(leads: &LeadRepository, score: u8) -> Lead {
        let mut lead = Lead::new(0, "Warehouse 12".into(), Geometry::point(-95.37, 29.76));
        lead.condition_label = ConditionLabel::Ponding;
        lead.condition_score = score;
        lead.tags.insert("flat".into());
        lead.address.city = Some("Houston".into());
        leads.create(&lead).await.unwrap()
    }

    #[tokio::test]
    async fn test_convert_to_prospect_links_and_marks_converted() {
        let f = fixture().await;
        let lead = seed(&f.leads, 4).await;

        let result = f.workflow.convert_to_prospect(lead.id).await.unwrap();
        assert_eq!(result.lead.linked_prospect_id, Some(result.prospect.id));
        assert_eq!(result.lead.status, LeadStatus::Converted);

        let prospect = f.crm.find_prospect(result.prospect.id).await.unwrap().unwrap();
        assert_eq!(prospect.status, "uncontacted");
        assert_eq!(prospect.address.city.as_deref(), Some("Houston"));
        assert!(prospect.tags.contains("flat"));
        assert!(prospect.tags.contains(CONVERSION_TAG));
        assert!(prospect.notes.contains("ponding (score 4/5)"));
    }

    #[tokio::test]
    async fn test_second_conversion_conflicts_without_creating() {
        let f = fixture().await;
        let lead = seed(&f.leads, 3).await;

        f.workflow.convert_to_prospect(lead.id).await.unwrap();
        let err = f.workflow.convert_to_prospect(lead.id).await.unwrap_err();
        assert_eq!(err.kind(), "ConflictError");
        assert_eq!(f.crm.count_prospects_for_lead(lead.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_property_uses_existing_account() {
        let f = fixture().await;
        let mut lead = seed(&f.leads, 3).await;
        lead.linked_account_id = Some(77);
        let lead = f.leads.update(&lead).await.unwrap();

        let result = f.workflow.create_property_from_lead(lead.id, None).await.unwrap();
        assert_eq!(result.property.account_id, Some(77));
        assert_eq!(result.lead.linked_property_id, Some(result.property.id));

        let err = f.workflow.create_property_from_lead(lead.id, Some(5)).await.unwrap_err();
        assert_eq!(err.kind(), "ConflictError");
    }

    #[tokio::test]
    async fn test_explicit_account_wins() {
        let f = fixture().await;
        let lead = seed(&f.leads, 3).await;

        let result = f.workflow.create_property_from_lead(lead.id, Some(9)).await.unwrap();
        assert_eq!(result.property.account_id, Some(9));
        assert_eq!(result.lead.linked_account_id, Some(9));
    }

    #[tokio::test]
    async fn test_follow_up_requires_due_date() {
        let f = fixture().await;
        let lead = seed(&f.leads, 3).await;

        let err = f
            .workflow
            .create_follow_up_task(lead.id, FollowUpOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        assert!(f.crm.tasks_for_lead(lead.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_follow_up_priority_and_links() {
        let f = fixture().await;
        let urgent = seed(&f.leads, 4).await;
        let routine = seed(&f.leads, 2).await;
        let converted = f.workflow.convert_to_prospect(urgent.id).await.unwrap();

        let options = FollowUpOptions {
            due_in_days: Some(7),
            ..Default::default()
        };
        let task = f.workflow.create_follow_up_task(urgent.id, options.clone()).await.unwrap();
        assert_eq!(task.priority, TaskPriority::High);
        assert_eq!(task.prospect_id, Some(converted.prospect.id));
        assert_eq!(task.property_id, None);
        assert!(task.due_date > Utc::now() + Duration::days(6));

        let task = f.workflow.create_follow_up_task(routine.id, options.clone()).await.unwrap();
        assert_eq!(task.priority, TaskPriority::Medium);

        let overridden = FollowUpOptions {
            priority: Some(TaskPriority::Low),
            ..options.clone()
        };
        let task = f.workflow.create_follow_up_task(urgent.id, overridden).await.unwrap();
        assert_eq!(task.priority, TaskPriority::Low);

        // Repeatable
        assert_eq!(f.crm.tasks_for_lead(urgent.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_follow_up_days_out_of_range() {
        let f = fixture().await;
        let lead = seed(&f.leads, 3).await;

        let options = FollowUpOptions {
            due_in_days: Some(u32::MAX),
            ..Default::default()
        };
        let err = f.workflow.create_follow_up_task(lead.id, options).await.unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        assert!(f.crm.tasks_for_lead(lead.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_lead_is_not_converted() {
        let f = fixture().await;
        let mut lead = seed(&f.leads, 3).await;
        lead.status = LeadStatus::Rejected;
        let lead = f.leads.update(&lead).await.unwrap();

        let err = f.workflow.convert_to_prospect(lead.id).await.unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        let err = f.workflow.create_property_from_lead(lead.id, Some(3)).await.unwrap_err();
        assert_eq!(err.kind(), "ValidationError");

        assert_eq!(f.crm.count_prospects_for_lead(lead.id).await.unwrap(), 0);
        let stored = f.leads.find_by_id(lead.id).await.unwrap().unwrap();
        assert_eq!(stored.status, LeadStatus::Rejected);
        assert_eq!(stored.linked_property_id, None);
    }

    #[tokio::test]
    async fn test_missing_lead_is_reference_error() {
        let f = fixture().await;
        assert_eq!(f.workflow.convert_to_prospect(404).await.unwrap_err().kind(), "ReferenceError");
    }

    /// Deletes the lead between creating the prospect and linking it
    struct VanishingLead {
        leads: Arc<LeadRepository>,
        crm: Arc<CrmRepository>,
    }

    #[async_trait]
    impl ProspectService for VanishingLead {
        async fn create_prospect(&self, prospect: &NewProspect) -> DomainResult<Prospect> {
            let created = self.crm.create_prospect(prospect).await?;
            if let Some(lead_id) = prospect.source_lead_id {
                self.leads.delete(lead_id).await?;
            }
            Ok(created)
        }
    }

    #[tokio::test]
    async fn test_link_failure_keeps_orphan_and_reports_transport() {
        let f = fixture().await;
        let lead = seed(&f.leads, 3).await;
        let workflow = ConversionWorkflow::new(
            f.leads.clone(),
            Arc::new(VanishingLead {
                leads: f.leads.clone(),
                crm: f.crm.clone(),
            }),
            f.crm.clone(),
            f.crm.clone(),
        );

        let err = workflow.convert_to_prospect(lead.id).await.unwrap_err();
        assert_eq!(err.kind(), "TransportError");
        assert!(err.message().contains("was created"));

        // Not rolled back
        assert_eq!(f.crm.count_prospects_for_lead(lead.id).await.unwrap(), 1);
    }
}
