//! CRM Entities
//!
//! Downstream records a lead is promoted into. Their services live outside
//! the lead subsystem; these types are the payloads exchanged with them.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use super::entity::Entity;
use super::lead::{Address, LeadId};

/// Prospect status assigned on conversion
pub const PROSPECT_STATUS_UNCONTACTED: &str = "uncontacted";

/// Tag appended to every converted prospect
pub const CONVERSION_TAG: &str = "roof-finder";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prospect {
    pub id: i64,
    pub name: String,
    #[serde(flatten)]
    pub address: Address,
    pub notes: String,
    pub tags: BTreeSet<String>,
    pub status: String,
    pub source_lead_id: Option<LeadId>,
    pub created_at: i64,
}

impl Entity for Prospect {
    type Id = i64;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProspect {
    pub name: String,
    pub address: Address,
    pub notes: String,
    pub tags: BTreeSet<String>,
    pub status: String,
    pub source_lead_id: Option<LeadId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: i64,
    pub name: String,
    #[serde(flatten)]
    pub address: Address,
    pub account_id: Option<i64>,
    pub estimated_sqft: Option<f64>,
    pub source_lead_id: Option<LeadId>,
    pub created_at: i64,
}

impl Entity for Property {
    type Id = i64;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProperty {
    pub name: String,
    pub address: Address,
    pub account_id: Option<i64>,
    pub estimated_sqft: Option<f64>,
    pub source_lead_id: Option<LeadId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "low" => TaskPriority::Low,
            "high" => TaskPriority::High,
            _ => TaskPriority::Medium,
        }
    }

    /// Default priority for a roof in the given condition
    pub fn for_condition_score(score: u8) -> Self {
        if score >= 4 {
            TaskPriority::High
        } else {
            TaskPriority::Medium
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpTask {
    pub id: i64,
    pub title: String,
    pub notes: Option<String>,
    pub due_date: DateTime<Utc>,
    pub priority: TaskPriority,
    pub status: String,
    pub lead_id: Option<LeadId>,
    pub account_id: Option<i64>,
    pub property_id: Option<i64>,
    pub prospect_id: Option<i64>,
    pub created_at: i64,
}

impl Entity for FollowUpTask {
    type Id = i64;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub notes: Option<String>,
    pub due_date: DateTime<Utc>,
    pub priority: TaskPriority,
    pub lead_id: Option<LeadId>,
    pub account_id: Option<i64>,
    pub property_id: Option<i64>,
    pub prospect_id: Option<i64>,
}

/// Caller options for a follow-up task
///
/// Either an explicit `due_date` or `due_in_days` must be given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowUpOptions {
    pub due_date: Option<DateTime<Utc>>,
    pub due_in_days: Option<u32>,
    pub priority: Option<TaskPriority>,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_from_condition() {
        assert_eq!(TaskPriority::for_condition_score(5), TaskPriority::High);
        assert_eq!(TaskPriority::for_condition_score(4), TaskPriority::High);
        assert_eq!(TaskPriority::for_condition_score(2), TaskPriority::Medium);
    }

    #[test]
    fn test_priority_serialization() {
        assert_eq!(TaskPriority::High.as_str(), "high");
        assert_eq!(TaskPriority::from_str("low"), TaskPriority::Low);
        assert_eq!(serde_json::to_string(&TaskPriority::Medium).unwrap(), "\"medium\"");
    }
}
