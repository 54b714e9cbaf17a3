//! Lead Store
//!
//! The visible lead set plus the selected lead's detail.
//!
//! Two writer roles: the query engine replaces the whole set, everything
//! else patches single records.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{Lead, LeadDetail, LeadId};

#[derive(Debug, Clone, Default)]
struct LeadStoreState {
    leads: Vec<Lead>,
    selected: Option<LeadDetail>,
    /// Bumped on every mutation so views can cheaply detect changes
    version: u64,
}

/// Cloneable handle to a map session's lead set
#[derive(Debug, Clone, Default)]
pub struct LeadStore {
    inner: Arc<RwLock<LeadStoreState>>,
}

impl LeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the visible leads, in query order
    pub async fn leads(&self) -> Vec<Lead> {
        self.inner.read().await.leads.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.leads.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.leads.is_empty()
    }

    pub async fn get(&self, id: LeadId) -> Option<Lead> {
        self.inner.read().await.leads.iter().find(|lead| lead.id == id).cloned()
    }

    pub async fn version(&self) -> u64 {
        self.inner.read().await.version
    }

    pub async fn selected(&self) -> Option<LeadDetail> {
        self.inner.read().await.selected.clone()
    }

    /// Bulk replace; query engine only
    pub(crate) async fn replace_all(&self, leads: Vec<Lead>) {
        let mut state = self.inner.write().await;
        state.leads = leads;
        state.version += 1;
    }

    /// Append a further page, skipping leads already present; query engine only
    pub(crate) async fn append(&self, leads: Vec<Lead>) {
        let mut state = self.inner.write().await;
        for lead in leads {
            if !state.leads.iter().any(|existing| existing.id == lead.id) {
                state.leads.push(lead);
            }
        }
        state.version += 1;
    }

    /// Update a lead in place (list entry and selected detail)
    ///
    /// Returns whether the lead was visible.
    pub async fn patch_lead(&self, updated: Lead) -> bool {
        let mut state = self.inner.write().await;
        let mut visible = false;
        if let Some(lead) = state.leads.iter_mut().find(|lead| lead.id == updated.id) {
            *lead = updated.clone();
            visible = true;
        }
        if let Some(detail) = state.selected.as_mut() {
            if detail.lead.id == updated.id {
                detail.lead = updated;
            }
        }
        state.version += 1;
        visible
    }

    /// Remove a lead from the set, dropping the selection if it was selected
    pub async fn remove_lead(&self, id: LeadId) {
        let mut state = self.inner.write().await;
        state.leads.retain(|lead| lead.id != id);
        if state.selected.as_ref().is_some_and(|detail| detail.lead.id == id) {
            state.selected = None;
        }
        state.version += 1;
    }

    pub async fn select(&self, detail: LeadDetail) {
        let mut state = self.inner.write().await;
        state.selected = Some(detail);
        state.version += 1;
    }

    pub async fn clear_selection(&self) {
        let mut state = self.inner.write().await;
        state.selected = None;
        state.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Geometry;

    fn lead(id: LeadId, name: &str) -> Lead {
        Lead::new(id, name.to_string(), Geometry::point(-95.0, 29.0))
    }

    #[tokio::test]
    async fn test_patch_updates_list_and_selection() {
        let store = LeadStore::new();
        store.replace_all(vec![lead(1, "A"), lead(2, "B")]).await;
        store
            .select(LeadDetail { lead: lead(2, "B"), images: Vec::new() })
            .await;

        assert!(store.patch_lead(lead(2, "B2")).await);
        assert_eq!(store.get(2).await.unwrap().name, "B2");
        assert_eq!(store.selected().await.unwrap().lead.name, "B2");

        assert!(!store.patch_lead(lead(9, "off screen")).await);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_append_skips_duplicates() {
        let store = LeadStore::new();
        store.replace_all(vec![lead(1, "A")]).await;
        store.append(vec![lead(1, "A"), lead(2, "B")]).await;
        let ids: Vec<_> = store.leads().await.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_remove_clears_selection() {
        let store = LeadStore::new();
        store.replace_all(vec![lead(1, "A")]).await;
        store
            .select(LeadDetail { lead: lead(1, "A"), images: Vec::new() })
            .await;
        let before = store.version().await;

        store.remove_lead(1).await;
        assert!(store.is_empty().await);
        assert!(store.selected().await.is_none());
        assert!(store.version().await > before);
    }
}
