//! Core trait for RiskWrapped backends.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::{
    ActionItem, AiInsight, HealthStatus, HierarchyPayload, Incident, NodeId, Risk, TokenResponse,
    User, UserId,
};

/// Read access to the RiskWrapped API.
///
/// Implementations own transport concerns (authentication headers,
/// timeouts, retries if any). Filters are passed through as query
/// parameters; callers must not assume the server honors them.
#[async_trait]
pub trait RiskBackend: Send + Sync {
    /// Exchange credentials for a bearer token (`POST /token`).
    async fn login(&self, username: &str, password: &str) -> Result<TokenResponse, TransportError>;

    /// Profile of the authenticated user (`GET /users/me`).
    async fn current_user(&self) -> Result<User, TransportError>;

    /// The organization hierarchy, in whichever shape the source serves.
    async fn fetch_hierarchy(&self) -> Result<HierarchyPayload, TransportError>;

    /// All risks (`GET /risks`). The API has no node filter for risks.
    async fn list_risks(&self) -> Result<Vec<Risk>, TransportError>;

    /// One risk (`GET /risks/{id}`).
    async fn get_risk(&self, id: i64) -> Result<Risk, TransportError>;

    /// Incidents, optionally for one node (`GET /incidents?node_id=`).
    async fn list_incidents(&self, node_id: Option<NodeId>) -> Result<Vec<Incident>, TransportError>;

    /// Action items, optionally for one assignee (`GET /action_items?assigned_to=`).
    async fn list_action_items(
        &self,
        assigned_to: Option<UserId>,
    ) -> Result<Vec<ActionItem>, TransportError>;

    /// AI insights, optionally for one node (`GET /insights?node_id=`).
    async fn list_insights(&self, node_id: Option<NodeId>) -> Result<Vec<AiInsight>, TransportError>;

    /// Backend health (`GET /health`).
    async fn health(&self) -> Result<HealthStatus, TransportError>;
}
