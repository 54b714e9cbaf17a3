//! Viewport Query Engine
//!
//! Keeps the lead store in sync with "leads matching the filters inside the
//! current bounding box".
//!
//! - Search text changes are debounced; attribute filter and bbox changes
//!   query immediately unless a search debounce window is open, in which
//!   case they ride along with the pending query.
//! - Every dispatched query takes the next sequence number before it starts.
//!   A response is applied only if its number is still the latest one
//!   dispatched; anything older is dropped, whatever order responses
//!   arrive in.
//! - `load_more` appends only onto rows of the query it pages. While a
//!   search debounce window is open, or the first page of a new query has
//!   not landed yet, it is deferred.
//! - Failed queries leave the store untouched and are not retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};

use crate::domain::{BBox, DomainResult, FilterPatch, Lead, LeadFilters, LeadQuery};
use super::store::LeadStore;

/// Where the engine fetches leads from
#[async_trait]
pub trait LeadSource: Send + Sync {
    async fn fetch(&self, query: &LeadQuery) -> DomainResult<Vec<Lead>>;
}

/// Progress of the most recent query, for loading/error affordances
#[derive(Debug, Clone, PartialEq)]
pub enum QueryStatus {
    Idle,
    Loading,
    Loaded { count: usize },
    Failed { message: String },
}

/// What a call into the engine did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Response applied to the store
    Applied { seq: u64, count: usize },
    /// A newer query was dispatched while this one was in flight
    Stale { seq: u64 },
    /// Search change scheduled behind the debounce delay
    Debounced,
    /// Folded into the pending debounced query, or a page request held
    /// back until the current query's first page is in the store
    Deferred,
    /// Nothing changed, no query sent
    Unchanged,
}

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub search_debounce: Duration,
    pub page_size: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            search_debounce: Duration::from_millis(300),
            page_size: 100,
        }
    }
}

#[derive(Debug, Default)]
struct EngineState {
    bbox: Option<BBox>,
    filters: LeadFilters,
    /// Rows loaded so far for the current query; next page starts here
    loaded: u32,
    /// Highest sequence number dispatched
    latest_seq: u64,
    debounce_generation: u64,
    debounce_open: bool,
    /// Bumped on every first-page dispatch
    dispatched_generation: u64,
    /// Query generation whose rows are in the store
    applied_generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Replace,
    Append,
}

struct EngineInner {
    source: Arc<dyn LeadSource>,
    store: LeadStore,
    options: EngineOptions,
    state: Mutex<EngineState>,
    status: watch::Sender<QueryStatus>,
}

/// Cloneable handle; clones share state
#[derive(Clone)]
pub struct ViewportQueryEngine {
    inner: Arc<EngineInner>,
}

impl ViewportQueryEngine {
    pub fn new(source: Arc<dyn LeadSource>, store: LeadStore, options: EngineOptions) -> Self {
        let (status, _) = watch::channel(QueryStatus::Idle);
        Self {
            inner: Arc::new(EngineInner {
                source,
                store,
                options,
                state: Mutex::new(EngineState::default()),
                status,
            }),
        }
    }

    pub fn store(&self) -> &LeadStore {
        &self.inner.store
    }

    /// Subscribe to query progress, including failures of debounced queries
    pub fn status(&self) -> watch::Receiver<QueryStatus> {
        self.inner.status.subscribe()
    }

    pub async fn bbox(&self) -> Option<BBox> {
        self.inner.state.lock().await.bbox
    }

    pub async fn filters(&self) -> LeadFilters {
        self.inner.state.lock().await.filters.clone()
    }

    /// Settled viewport change; `None` means unbounded
    pub async fn set_bbox(&self, bbox: Option<BBox>) -> DomainResult<QueryOutcome> {
        {
            let mut state = self.inner.state.lock().await;
            if state.bbox == bbox {
                return Ok(QueryOutcome::Unchanged);
            }
            state.bbox = bbox;
            if state.debounce_open {
                return Ok(QueryOutcome::Deferred);
            }
        }
        self.refresh().await
    }

    /// Merge a partial filter change
    pub async fn set_filters(&self, patch: FilterPatch) -> DomainResult<QueryOutcome> {
        let generation = {
            let mut state = self.inner.state.lock().await;

            let mut merged = state.filters.clone();
            let change = merged.merge(patch);
            merged.validate()?;
            state.filters = merged;

            if change.search {
                state.debounce_generation += 1;
                state.debounce_open = true;
                state.debounce_generation
            } else if change.attributes {
                if state.debounce_open {
                    return Ok(QueryOutcome::Deferred);
                }
                0
            } else {
                return Ok(QueryOutcome::Unchanged);
            }
        };

        if generation == 0 {
            return self.refresh().await;
        }

        let engine = self.clone();
        let delay = self.inner.options.search_debounce;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.fire_debounced(generation).await;
        });
        Ok(QueryOutcome::Debounced)
    }

    /// Re-run the current query from the first page
    pub async fn refresh(&self) -> DomainResult<QueryOutcome> {
        self.dispatch(Mode::Replace).await
    }

    /// Fetch the next page of the current query and append it
    pub async fn load_more(&self) -> DomainResult<QueryOutcome> {
        self.dispatch(Mode::Append).await
    }

    async fn fire_debounced(&self, generation: u64) {
        {
            let mut state = self.inner.state.lock().await;
            if state.debounce_generation != generation {
                // A later keystroke restarted the window
                return;
            }
            state.debounce_open = false;
        }
        if let Err(e) = self.refresh().await {
            log::warn!("Debounced lead query failed: {}", e);
        }
    }

    async fn dispatch(&self, mode: Mode) -> DomainResult<QueryOutcome> {
        let (seq, generation, query) = {
            let mut state = self.inner.state.lock().await;
            if mode == Mode::Append
                && (state.debounce_open || state.dispatched_generation != state.applied_generation)
            {
                return Ok(QueryOutcome::Deferred);
            }
            state.latest_seq += 1;
            let (offset, generation) = match mode {
                Mode::Replace => {
                    state.dispatched_generation += 1;
                    (0, state.dispatched_generation)
                }
                Mode::Append => (state.loaded, state.applied_generation),
            };
            let query = LeadQuery {
                bbox: state.bbox,
                filters: state.filters.clone(),
                limit: self.inner.options.page_size,
                offset,
            };
            (state.latest_seq, generation, query)
        };

        log::debug!("Dispatching lead query #{} (offset {})", seq, query.offset);
        self.inner.status.send_replace(QueryStatus::Loading);

        let result = self.inner.source.fetch(&query).await;

        let mut state = self.inner.state.lock().await;
        if seq != state.latest_seq
            || (mode == Mode::Append && generation != state.applied_generation)
        {
            log::debug!("Discarding stale lead query #{} (latest #{})", seq, state.latest_seq);
            return Ok(QueryOutcome::Stale { seq });
        }

        match result {
            Ok(leads) => {
                let count = leads.len();
                match mode {
                    Mode::Replace => {
                        state.applied_generation = generation;
                        state.loaded = count as u32;
                        self.inner.store.replace_all(leads).await;
                    }
                    Mode::Append => {
                        state.loaded += count as u32;
                        self.inner.store.append(leads).await;
                    }
                }
                let total = self.inner.store.len().await;
                self.inner.status.send_replace(QueryStatus::Loaded { count: total });
                log::debug!("Applied lead query #{} ({} rows)", seq, count);
                Ok(QueryOutcome::Applied { seq, count })
            }
            Err(e) => {
                log::warn!("Lead query #{} failed: {}", seq, e);
                self.inner.status.send_replace(QueryStatus::Failed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }
}
