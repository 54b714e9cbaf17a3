mod engine;
mod store;

pub use engine::{EngineOptions, LeadSource, QueryOutcome, QueryStatus, ViewportQueryEngine};
pub use store::LeadStore;
