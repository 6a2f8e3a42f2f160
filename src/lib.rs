//! Org-hierarchy navigation and node-scoped risk insights for the RiskWrapped API
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use riskwrapped::{
//!     DashboardConfig, HttpBackend, OrgTree, ScopeMode, ScopedDataAggregator, Session,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DashboardConfig::default();
//! let session = Session::with_token("eyJhbGciOi...");
//! let backend = Arc::new(HttpBackend::new(&config, session)?);
//!
//! // Load the hierarchy once, then resolve a selection against it
//! let tree = OrgTree::load(backend.as_ref()).await?;
//! let scope = riskwrapped::scope::resolve(&tree, 2, ScopeMode::SelfAndDescendants)?;
//!
//! let aggregator = ScopedDataAggregator::new(backend);
//! let bundle = aggregator.fetch_scoped(&tree, &scope.into()).await?;
//! let summary = riskwrapped::summarize(&bundle);
//! println!("{} incidents, {} orphaned", summary.incident_count, summary.orphans.incidents);
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod config;
pub mod controller;
pub mod dashboard;
pub mod error;
pub mod scope;
pub mod session;
pub mod transport;
pub mod tree;
pub mod types;

// Re-export main types
pub use aggregate::{
    summarize, AggregatorConfig, RiskScoping, ScopeQuery, Scoped, ScopedBundle,
    ScopedDataAggregator, Summary,
};
pub use config::{DashboardConfig, HierarchySource};
pub use controller::{ScopedView, SelectOutcome, SelectionController, SelectionState};
pub use error::{Collection, DashboardError, PartialLoadError, Result, TransportError};
pub use scope::{InsightScope, ScopeMode};
pub use session::Session;
pub use transport::{HttpBackend, MockBackend, RiskBackend};
pub use tree::{OrgNode, OrgTree};
pub use types::*;
