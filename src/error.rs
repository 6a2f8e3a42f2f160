//! Error types for the dashboard client

use std::fmt;

use thiserror::Error;

use crate::types::NodeId;

/// Failure at the backend boundary (network, HTTP status, payload decoding).
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned a non-success status
    #[error("Server error {status}: {message}")]
    Status { status: u16, message: String },

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or rejected bearer token (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Backend unavailable (used by in-memory backends)
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Decode(e.to_string())
    }
}

/// One of the four collections fetched for a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    Risks,
    Incidents,
    Actions,
    Insights,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Risks,
        Collection::Incidents,
        Collection::Actions,
        Collection::Insights,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Risks => "risks",
            Collection::Incidents => "incidents",
            Collection::Actions => "actions",
            Collection::Insights => "insights",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One or more scoped sub-fetches failed.
///
/// Carries every failing collection with its cause so a view can degrade
/// per section ("actions failed to load") instead of blanking the panel.
#[derive(Debug)]
pub struct PartialLoadError {
    pub failures: Vec<(Collection, TransportError)>,
}

impl PartialLoadError {
    /// Collections that failed, in fetch order.
    pub fn failed(&self) -> Vec<Collection> {
        self.failures.iter().map(|(c, _)| *c).collect()
    }

    pub fn is_failed(&self, collection: Collection) -> bool {
        self.failures.iter().any(|(c, _)| *c == collection)
    }
}

impl fmt::Display for PartialLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .failures
            .iter()
            .map(|(c, e)| format!("{} ({})", c, e))
            .collect();
        write!(f, "failed to load {}", parts.join(", "))
    }
}

impl std::error::Error for PartialLoadError {}

/// Dashboard client error
#[derive(Debug, Error)]
pub enum DashboardError {
    /// Transport-level failure
    #[error("Fetch error: {0}")]
    Fetch(#[from] TransportError),

    /// Malformed hierarchy payload
    #[error("Malformed hierarchy: {0}")]
    Parse(String),

    /// Selection references an id absent from the loaded tree
    #[error("Node {0} not found in hierarchy")]
    NodeNotFound(NodeId),

    /// Some of the scoped collections failed to load
    #[error("Partial load: {0}")]
    PartialLoad(#[from] PartialLoadError),

    /// An operation needed the hierarchy before it was loaded
    #[error("Hierarchy not loaded")]
    TreeNotLoaded,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Token file could not be read or written
    #[error("Session store error: {0}")]
    SessionStore(#[from] std::io::Error),
}

/// Result type for dashboard operations
pub type Result<T> = std::result::Result<T, DashboardError>;
