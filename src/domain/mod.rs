//! Domain Layer
//!
//! Contains all domain entities and core abstractions.
//! This layer has NO I/O (serde and chrono only).

mod entity;
mod geometry;
mod lead;
mod lead_image;
mod filters;
mod crm;

pub use entity::{Entity, DomainError, DomainResult};
pub use geometry::{BBox, Coordinate, Geometry, GeometryKind, Polygon};
pub use lead::{normalize_tags, validate_score, Address, ConditionLabel, Lead, LeadId, LeadPatch, LeadStatus};
pub use lead_image::{LeadDetail, LeadImage, LeadImageView, SignedUrl};
pub use filters::{FilterChange, FilterPatch, LeadFilters, LeadQuery};
pub use crm::{
    FollowUpOptions, FollowUpTask, NewProperty, NewProspect, NewTask, Prospect, Property,
    TaskPriority, CONVERSION_TAG, PROSPECT_STATUS_UNCONTACTED,
};
