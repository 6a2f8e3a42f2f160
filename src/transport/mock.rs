//! In-memory backend for tests and demos.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::traits::RiskBackend;
use crate::error::{Collection, TransportError};
use crate::tree;
use crate::types::{
    ActionItem, AiInsight, HealthStatus, HierarchyPayload, Incident, NodeId, Risk, TokenResponse,
    User, UserId,
};

/// Mock backend serving fixed records.
///
/// Filters behave like the API's query parameters unless
/// [`MockBackend::ignoring_filters`] is set, which mimics an endpoint that
/// silently drops them. Failures and latency can be injected per
/// collection or per requested node.
pub struct MockBackend {
    hierarchy: HierarchyPayload,
    users: Vec<(User, String)>,
    risks: Vec<Risk>,
    incidents: Vec<Incident>,
    actions: Vec<ActionItem>,
    insights: Vec<AiInsight>,
    honor_filters: bool,
    latency: HashMap<Collection, Duration>,
    node_latency: HashMap<NodeId, Duration>,
    hierarchy_latency: Option<Duration>,
    failing: RwLock<HashSet<Collection>>,
    hierarchy_unavailable: RwLock<bool>,
    logged_in: RwLock<Option<UserId>>,
    requests: RwLock<Vec<String>>,
}

impl MockBackend {
    /// Create a mock serving the built-in hierarchy and no records.
    pub fn new() -> Self {
        Self {
            hierarchy: HierarchyPayload::Nested(tree::fixture_payload()),
            users: Vec::new(),
            risks: Vec::new(),
            incidents: Vec::new(),
            actions: Vec::new(),
            insights: Vec::new(),
            honor_filters: true,
            latency: HashMap::new(),
            node_latency: HashMap::new(),
            hierarchy_latency: None,
            failing: RwLock::new(HashSet::new()),
            hierarchy_unavailable: RwLock::new(false),
            logged_in: RwLock::new(None),
            requests: RwLock::new(Vec::new()),
        }
    }

    /// Serve a different hierarchy payload.
    pub fn with_hierarchy(mut self, payload: HierarchyPayload) -> Self {
        self.hierarchy = payload;
        self
    }

    /// Register a user who can log in with `password`.
    pub fn with_user(mut self, user: User, password: impl Into<String>) -> Self {
        self.users.push((user, password.into()));
        self
    }

    pub fn with_risks(mut self, risks: Vec<Risk>) -> Self {
        self.risks = risks;
        self
    }

    pub fn with_incidents(mut self, incidents: Vec<Incident>) -> Self {
        self.incidents = incidents;
        self
    }

    pub fn with_actions(mut self, actions: Vec<ActionItem>) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_insights(mut self, insights: Vec<AiInsight>) -> Self {
        self.insights = insights;
        self
    }

    /// Return every record regardless of query filters.
    pub fn ignoring_filters(mut self) -> Self {
        self.honor_filters = false;
        self
    }

    /// Delay every request for one collection.
    pub fn with_latency(mut self, collection: Collection, delay: Duration) -> Self {
        self.latency.insert(collection, delay);
        self
    }

    /// Delay every request filtered to `node_id`.
    pub fn with_node_latency(mut self, node_id: NodeId, delay: Duration) -> Self {
        self.node_latency.insert(node_id, delay);
        self
    }

    /// Delay the hierarchy response.
    pub fn with_hierarchy_latency(mut self, delay: Duration) -> Self {
        self.hierarchy_latency = Some(delay);
        self
    }

    /// Make requests for `collection` fail until [`MockBackend::recover`].
    pub async fn fail(&self, collection: Collection) {
        self.failing.write().await.insert(collection);
    }

    pub async fn recover(&self, collection: Collection) {
        self.failing.write().await.remove(&collection);
    }

    /// Make hierarchy requests fail.
    pub async fn set_hierarchy_unavailable(&self, unavailable: bool) {
        *self.hierarchy_unavailable.write().await = unavailable;
    }

    /// Requests served so far, e.g. `incidents?node_id=3`.
    pub async fn requests(&self) -> Vec<String> {
        self.requests.read().await.clone()
    }

    async fn serve(
        &self,
        collection: Collection,
        filter: Option<(&str, i64)>,
    ) -> Result<(), TransportError> {
        let request = match filter {
            Some((key, value)) => format!("{}?{}={}", collection, key, value),
            None => collection.to_string(),
        };
        self.requests.write().await.push(request);

        if let Some(delay) = self.latency.get(&collection) {
            tokio::time::sleep(*delay).await;
        }
        if let Some((key, node_id)) = filter {
            if key == "node_id" {
                if let Some(delay) = self.node_latency.get(&node_id) {
                    tokio::time::sleep(*delay).await;
                }
            }
        }

        if self.failing.read().await.contains(&collection) {
            return Err(TransportError::Unavailable(format!(
                "{} endpoint failing",
                collection
            )));
        }
        Ok(())
    }

    fn filtered<T: Clone>(&self, records: &[T], keep: impl Fn(&T) -> bool) -> Vec<T> {
        records
            .iter()
            .filter(|r| !self.honor_filters || keep(r))
            .cloned()
            .collect()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RiskBackend for MockBackend {
    async fn login(&self, username: &str, password: &str) -> Result<TokenResponse, TransportError> {
        self.requests.write().await.push("token".to_string());

        let user = self
            .users
            .iter()
            .find(|(u, p)| u.username == username && p == password)
            .map(|(u, _)| u)
            .ok_or_else(|| TransportError::Unauthorized("Incorrect username or password".into()))?;

        *self.logged_in.write().await = Some(user.id);
        Ok(TokenResponse {
            access_token: format!("mock-token-{}", user.id),
            token_type: Some("bearer".to_string()),
        })
    }

    async fn current_user(&self) -> Result<User, TransportError> {
        self.requests.write().await.push("users/me".to_string());

        let id = (*self.logged_in.read().await)
            .ok_or_else(|| TransportError::Unauthorized("Not authenticated".into()))?;
        self.users
            .iter()
            .map(|(u, _)| u)
            .find(|u| u.id == id)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("user {}", id)))
    }

    async fn fetch_hierarchy(&self) -> Result<HierarchyPayload, TransportError> {
        self.requests.write().await.push("hierarchy".to_string());
        if let Some(delay) = self.hierarchy_latency {
            tokio::time::sleep(delay).await;
        }

        if *self.hierarchy_unavailable.read().await {
            return Err(TransportError::Unavailable("hierarchy endpoint failing".into()));
        }
        Ok(self.hierarchy.clone())
    }

    async fn list_risks(&self) -> Result<Vec<Risk>, TransportError> {
        self.serve(Collection::Risks, None).await?;
        Ok(self.risks.clone())
    }

    async fn get_risk(&self, id: i64) -> Result<Risk, TransportError> {
        self.serve(Collection::Risks, Some(("id", id))).await?;
        self.risks
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("/risks/{}", id)))
    }

    async fn list_incidents(&self, node_id: Option<NodeId>) -> Result<Vec<Incident>, TransportError> {
        self.serve(Collection::Incidents, node_id.map(|n| ("node_id", n)))
            .await?;
        Ok(self.filtered(&self.incidents, |i| {
            node_id.map_or(true, |n| i.node_id == Some(n))
        }))
    }

    async fn list_action_items(
        &self,
        assigned_to: Option<UserId>,
    ) -> Result<Vec<ActionItem>, TransportError> {
        self.serve(Collection::Actions, assigned_to.map(|u| ("assigned_to", u)))
            .await?;
        Ok(self.filtered(&self.actions, |a| {
            assigned_to.map_or(true, |u| a.assigned_to == u)
        }))
    }

    async fn list_insights(&self, node_id: Option<NodeId>) -> Result<Vec<AiInsight>, TransportError> {
        self.serve(Collection::Insights, node_id.map(|n| ("node_id", n)))
            .await?;
        Ok(self.filtered(&self.insights, |i| {
            node_id.map_or(true, |n| i.scope.trim() == n.to_string())
        }))
    }

    async fn health(&self) -> Result<HealthStatus, TransportError> {
        self.requests.write().await.push("health".to_string());
        Ok(HealthStatus { db: true, ai: true })
    }
}
