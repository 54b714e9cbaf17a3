//! Lead Entity
//!
//! A prospective roofing opportunity identified on the map, pending qualification.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use super::entity::{DomainError, DomainResult, Entity};
use super::geometry::Geometry;

pub type LeadId = i64;

/// Observed roof condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConditionLabel {
    Dirty,
    Aged,
    Patched,
    Ponding,
    Damaged,
    #[default]
    Other,
}

impl ConditionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionLabel::Dirty => "dirty",
            ConditionLabel::Aged => "aged",
            ConditionLabel::Patched => "patched",
            ConditionLabel::Ponding => "ponding",
            ConditionLabel::Damaged => "damaged",
            ConditionLabel::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "dirty" => ConditionLabel::Dirty,
            "aged" => ConditionLabel::Aged,
            "patched" => ConditionLabel::Patched,
            "ponding" => ConditionLabel::Ponding,
            "damaged" => ConditionLabel::Damaged,
            _ => ConditionLabel::Other,
        }
    }
}

/// Qualification status
///
/// `new -> {assessed, contacted, qualified} -> {converted, rejected}`.
/// The middle three are freely interchangeable; `converted` is only
/// reached through a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    #[default]
    New,
    Assessed,
    Contacted,
    Qualified,
    Converted,
    Rejected,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Assessed => "assessed",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Converted => "converted",
            LeadStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "assessed" => LeadStatus::Assessed,
            "contacted" => LeadStatus::Contacted,
            "qualified" => LeadStatus::Qualified,
            "converted" => LeadStatus::Converted,
            "rejected" => LeadStatus::Rejected,
            _ => LeadStatus::New,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LeadStatus::Converted | LeadStatus::Rejected)
    }

    /// Check a user-requested status change
    pub fn check_user_transition(&self, to: LeadStatus) -> DomainResult<()> {
        if *self == to {
            return Ok(());
        }
        if to == LeadStatus::Converted {
            return Err(DomainError::Validation(
                "Status 'converted' is set by conversion only".into(),
            ));
        }
        if self.is_terminal() {
            return Err(DomainError::Validation(format!(
                "Lead is {} and can no longer change status",
                self.as_str()
            )));
        }
        Ok(())
    }
}

/// Postal address of the roof
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

impl Address {
    /// Single-line form, skipping empty parts
    pub fn one_line(&self) -> String {
        [&self.street, &self.city, &self.state, &self.zip]
            .iter()
            .filter_map(|part| part.as_deref())
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A lead record
///
/// A lead whose stored geometry cannot be decoded carries no coordinates:
/// it serializes as `"geometry": null` and gets no map marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub name: String,
    /// `None` when the stored geometry failed to decode (no map marker)
    pub geometry: Option<Geometry>,
    pub condition_label: ConditionLabel,
    pub condition_score: u8,
    pub status: LeadStatus,
    pub tags: BTreeSet<String>,
    pub notes: Option<String>,
    #[serde(flatten)]
    pub address: Address,
    pub estimated_sqft: Option<f64>,
    pub estimated_repair_cost: Option<f64>,
    pub linked_prospect_id: Option<i64>,
    pub linked_account_id: Option<i64>,
    pub linked_property_id: Option<i64>,
    pub created_by: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Lead {
    /// Create a new lead with default metadata
    pub fn new(id: LeadId, name: String, geometry: Geometry) -> Self {
        Self {
            id,
            name,
            geometry: Some(geometry),
            condition_label: ConditionLabel::default(),
            condition_score: 3,
            status: LeadStatus::New,
            tags: BTreeSet::new(),
            notes: None,
            address: Address::default(),
            estimated_sqft: None,
            estimated_repair_cost: None,
            linked_prospect_id: None,
            linked_account_id: None,
            linked_property_id: None,
            created_by: String::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Check the field-level invariants before persisting
    pub fn validate(&self) -> DomainResult<()> {
        match &self.geometry {
            Some(geometry) => geometry.validate()?,
            None => return Err(DomainError::Validation("Lead geometry is required".into())),
        }
        self.validate_metadata()
    }

    /// Everything except the geometry
    pub fn validate_metadata(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::Validation("Lead name is required".into()));
        }
        validate_score(self.condition_score)?;
        validate_estimate("estimated_sqft", self.estimated_sqft)?;
        validate_estimate("estimated_repair_cost", self.estimated_repair_cost)?;
        Ok(())
    }

    /// Apply a whitelisted partial update
    ///
    /// All checks run before any field is touched, so a rejected patch
    /// leaves the lead unchanged.
    pub fn apply_patch(&mut self, patch: LeadPatch) -> DomainResult<()> {
        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(DomainError::Validation("Lead name is required".into()));
            }
        }
        if let Some(score) = patch.condition_score {
            validate_score(score)?;
        }
        if let Some(status) = patch.status {
            self.status.check_user_transition(status)?;
        }
        validate_estimate("estimated_sqft", patch.estimated_sqft)?;
        validate_estimate("estimated_repair_cost", patch.estimated_repair_cost)?;
        check_write_once("prospect", self.linked_prospect_id, patch.linked_prospect_id)?;
        check_write_once("property", self.linked_property_id, patch.linked_property_id)?;

        if let Some(name) = patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(label) = patch.condition_label {
            self.condition_label = label;
        }
        if let Some(score) = patch.condition_score {
            self.condition_score = score;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(tags) = patch.tags {
            self.tags = normalize_tags(tags);
        }
        if let Some(notes) = patch.notes {
            self.notes = Some(notes);
        }
        if let Some(street) = patch.street {
            self.address.street = Some(street);
        }
        if let Some(city) = patch.city {
            self.address.city = Some(city);
        }
        if let Some(state) = patch.state {
            self.address.state = Some(state);
        }
        if let Some(zip) = patch.zip {
            self.address.zip = Some(zip);
        }
        if patch.estimated_sqft.is_some() {
            self.estimated_sqft = patch.estimated_sqft;
        }
        if patch.estimated_repair_cost.is_some() {
            self.estimated_repair_cost = patch.estimated_repair_cost;
        }
        if patch.linked_prospect_id.is_some() {
            self.linked_prospect_id = patch.linked_prospect_id;
        }
        if patch.linked_account_id.is_some() {
            self.linked_account_id = patch.linked_account_id;
        }
        if patch.linked_property_id.is_some() {
            self.linked_property_id = patch.linked_property_id;
        }
        Ok(())
    }

    /// Replace the geometry, keeping its shape kind
    pub fn replace_geometry(&mut self, geometry: Geometry) -> DomainResult<()> {
        geometry.validate()?;
        if let Some(current) = &self.geometry {
            if current.kind() != geometry.kind() {
                return Err(DomainError::Validation(format!(
                    "A {} lead cannot become a {} lead",
                    current.kind().as_str(),
                    geometry.kind().as_str()
                )));
            }
        }
        self.geometry = Some(geometry);
        Ok(())
    }
}

impl Entity for Lead {
    type Id = LeadId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Partial update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadPatch {
    pub name: Option<String>,
    pub condition_label: Option<ConditionLabel>,
    pub condition_score: Option<u8>,
    pub status: Option<LeadStatus>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub estimated_sqft: Option<f64>,
    pub estimated_repair_cost: Option<f64>,
    pub linked_prospect_id: Option<i64>,
    pub linked_account_id: Option<i64>,
    pub linked_property_id: Option<i64>,
}

/// Trim, drop empties, dedupe
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

pub fn validate_score(score: u8) -> DomainResult<()> {
    if (1..=5).contains(&score) {
        Ok(())
    } else {
        Err(DomainError::Validation(format!(
            "Condition score must be between 1 and 5, got {}",
            score
        )))
    }
}

fn validate_estimate(field: &str, value: Option<f64>) -> DomainResult<()> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(DomainError::Validation(format!(
            "{} must be a non-negative number",
            field
        ))),
        _ => Ok(()),
    }
}

fn check_write_once(target: &str, current: Option<i64>, requested: Option<i64>) -> DomainResult<()> {
    match (current, requested) {
        (Some(existing), Some(new)) if existing != new => Err(DomainError::Conflict(format!(
            "Lead is already linked to {} {}",
            target, existing
        ))),
        _ => Ok(()),
    }
}
