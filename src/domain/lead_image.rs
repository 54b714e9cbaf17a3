//! Lead Image Entity
//!
//! Photos attached to a lead. Images are owned by their lead and removed with it.

use serde::{Deserialize, Serialize};
use super::entity::Entity;
use super::lead::{Lead, LeadId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadImage {
    pub id: i64,
    pub lead_id: LeadId,
    /// Path relative to the image storage root
    pub file_ref: String,
    pub content_type: String,
    pub description: Option<String>,
    pub created_at: i64,
}

impl LeadImage {
    pub fn new(id: i64, lead_id: LeadId, file_ref: String, content_type: String) -> Self {
        Self {
            id,
            lead_id,
            file_ref,
            content_type,
            description: None,
            created_at: 0,
        }
    }
}

impl Entity for LeadImage {
    type Id = i64;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Time-limited access URL for an image file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedUrl {
    pub url: String,
    /// Unix seconds
    pub expires_at: i64,
}

/// An image record together with a fresh signed URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadImageView {
    #[serde(flatten)]
    pub image: LeadImage,
    pub signed_url: SignedUrl,
}

/// Full detail of the selected lead
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadDetail {
    pub lead: Lead,
    pub images: Vec<LeadImageView>,
}
