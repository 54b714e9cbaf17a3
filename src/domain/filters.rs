//! Viewport Query Types
//!
//! Filter set and paging parameters for spatial + attribute lead queries.

use serde::{Deserialize, Serialize};
use super::entity::{DomainError, DomainResult};
use super::geometry::BBox;
use super::lead::{validate_score, ConditionLabel, LeadStatus};

/// Attribute filters applied on top of the bounding box
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadFilters {
    /// Case-insensitive substring over name, notes and address
    pub search: String,
    pub status: Option<LeadStatus>,
    pub condition_label: Option<ConditionLabel>,
    /// Lead must carry every listed tag
    pub tags: Vec<String>,
    pub min_score: Option<u8>,
    pub max_score: Option<u8>,
}

impl LeadFilters {
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(min) = self.min_score {
            validate_score(min)?;
        }
        if let Some(max) = self.max_score {
            validate_score(max)?;
        }
        if let (Some(min), Some(max)) = (self.min_score, self.max_score) {
            if min > max {
                return Err(DomainError::Validation(format!(
                    "Score range is empty: {}..{}",
                    min, max
                )));
            }
        }
        Ok(())
    }

    /// Merge a partial change, returning what kind of change it was
    pub fn merge(&mut self, patch: FilterPatch) -> FilterChange {
        let mut change = FilterChange::default();

        if let Some(search) = patch.search {
            if search != self.search {
                self.search = search;
                change.search = true;
            }
        }
        let before = (
            self.status,
            self.condition_label,
            self.tags.clone(),
            self.min_score,
            self.max_score,
        );
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(label) = patch.condition_label {
            self.condition_label = label;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(min) = patch.min_score {
            self.min_score = min;
        }
        if let Some(max) = patch.max_score {
            self.max_score = max;
        }
        change.attributes = before
            != (
                self.status,
                self.condition_label,
                self.tags.clone(),
                self.min_score,
                self.max_score,
            );
        change
    }
}

/// Partial filter update; the outer `Option` means "leave unchanged",
/// the inner one clears the filter
#[derive(Debug, Clone, Default)]
pub struct FilterPatch {
    pub search: Option<String>,
    pub status: Option<Option<LeadStatus>>,
    pub condition_label: Option<Option<ConditionLabel>>,
    pub tags: Option<Vec<String>>,
    pub min_score: Option<Option<u8>>,
    pub max_score: Option<Option<u8>>,
}

impl FilterPatch {
    pub fn search(text: impl Into<String>) -> Self {
        Self {
            search: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn status(status: Option<LeadStatus>) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// Which parts of the filter set a merge touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterChange {
    pub search: bool,
    pub attributes: bool,
}

impl FilterChange {
    pub fn is_empty(&self) -> bool {
        !self.search && !self.attributes
    }
}

/// A complete list request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadQuery {
    /// `None` means unbounded
    pub bbox: Option<BBox>,
    #[serde(flatten)]
    pub filters: LeadFilters,
    pub limit: u32,
    pub offset: u32,
}

impl LeadQuery {
    pub fn new(bbox: Option<BBox>, filters: LeadFilters, limit: u32) -> Self {
        Self {
            bbox,
            filters,
            limit,
            offset: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_reports_search_change() {
        let mut filters = LeadFilters::default();
        let change = filters.merge(FilterPatch::search("warehouse"));
        assert!(change.search);
        assert!(!change.attributes);

        // Same text again is not a change
        assert!(filters.merge(FilterPatch::search("warehouse")).is_empty());
    }

    #[test]
    fn test_merge_reports_attribute_change_and_clears() {
        let mut filters = LeadFilters::default();
        let change = filters.merge(FilterPatch::status(Some(LeadStatus::Qualified)));
        assert!(change.attributes);
        assert_eq!(filters.status, Some(LeadStatus::Qualified));

        filters.merge(FilterPatch::status(None));
        assert_eq!(filters.status, None);
    }

    #[test]
    fn test_validate_score_range() {
        let filters = LeadFilters {
            min_score: Some(4),
            max_score: Some(2),
            ..Default::default()
        };
        assert!(filters.validate().is_err());
    }
}
