//! Per-user default dashboard and the login flow around it.

use serde::Serialize;
use tracing::{info, warn};

use crate::aggregate::{summarize, ScopeQuery, ScopedBundle, ScopedDataAggregator, Summary};
use crate::error::{DashboardError, Result, TransportError};
use crate::scope::{self, InsightScope, ScopeMode};
use crate::session::Session;
use crate::transport::RiskBackend;
use crate::tree::OrgTree;
use crate::types::{TokenResponse, User};

/// The signed-in user's landing view.
#[derive(Debug, Clone, Serialize)]
pub struct UserDashboard {
    pub user: User,
    pub scope: InsightScope,
    pub bundle: ScopedBundle,
    pub summary: Summary,
}

/// Exchange credentials for a token and store it in `session`.
pub async fn login<B: RiskBackend + ?Sized>(
    backend: &B,
    session: &Session,
    username: &str,
    password: &str,
) -> Result<TokenResponse> {
    let token = backend.login(username, password).await?;
    session.set_token(token.access_token.clone()).await?;
    info!(username, "Logged in");
    Ok(token)
}

/// Forget the stored token.
pub async fn logout(session: &Session) -> Result<()> {
    session.clear().await?;
    info!("Logged out");
    Ok(())
}

/// Load the current user's dashboard: their own node only, with actions
/// limited to those assigned to them.
pub async fn load_user_dashboard<B: RiskBackend + ?Sized>(
    aggregator: &ScopedDataAggregator<B>,
    tree: &OrgTree,
) -> Result<UserDashboard> {
    let user = aggregator.backend().current_user().await?;

    let scope = scope::resolve(tree, user.node_id, ScopeMode::SelfOnly).map_err(|e| {
        warn!(user = %user.username, node = user.node_id, "User's node is not in the hierarchy");
        e
    })?;

    let query = ScopeQuery::new(scope.clone()).assigned_to(user.id);
    let bundle = aggregator.fetch_scoped(tree, &query).await?;
    let summary = summarize(&bundle);

    info!(
        user = %user.username,
        node = user.node_id,
        incidents = summary.incident_count,
        actions = summary.action_count,
        "Loaded user dashboard"
    );

    Ok(UserDashboard {
        user,
        scope,
        bundle,
        summary,
    })
}

/// Whether `err` means the caller must log in again.
pub fn needs_login(err: &DashboardError) -> bool {
    matches!(
        err,
        DashboardError::Fetch(TransportError::Unauthorized(_))
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::transport::MockBackend;
    use crate::types::{ActionItem, Incident};

    fn user(node_id: i64) -> User {
        User {
            id: 7,
            username: "alice".into(),
            email: "alice@testbank.com".into(),
            role: Some("manager".into()),
            node_id,
            level: Some(3),
            is_active: Some(true),
        }
    }

    fn backend(node_id: i64) -> MockBackend {
        MockBackend::new()
            .with_user(user(node_id), "P@ssw0rd")
            .with_incidents(vec![Incident {
                id: 10,
                name: "Outage".into(),
                description: None,
                root_cause: None,
                loss_amount: Some(1_200),
                is_financial: true,
                node_id: Some(3),
                created_at: None,
            }])
            .with_actions(vec![
                ActionItem {
                    id: 20,
                    description: "Patch servers".into(),
                    risk_id: None,
                    assigned_to: 7,
                    status: None,
                    due_date: None,
                    node_id: Some(6),
                },
                ActionItem {
                    id: 21,
                    description: "Someone else's".into(),
                    risk_id: None,
                    assigned_to: 8,
                    status: None,
                    due_date: None,
                    node_id: Some(3),
                },
            ])
    }

    #[tokio::test]
    async fn test_login_stores_token() {
        let backend = backend(3);
        let session = Session::new();

        login(&backend, &session, "alice", "P@ssw0rd").await.unwrap();
        assert_eq!(session.token().await.as_deref(), Some("mock-token-7"));

        logout(&session).await.unwrap();
        assert!(!session.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_failed_login_leaves_session_empty() {
        let backend = backend(3);
        let session = Session::new();

        let err = login(&backend, &session, "alice", "nope").await.unwrap_err();
        assert!(needs_login(&err));
        assert!(!session.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_user_dashboard_scopes_to_user() {
        let backend = Arc::new(backend(3));
        let session = Session::new();
        login(backend.as_ref(), &session, "alice", "P@ssw0rd").await.unwrap();

        let aggregator = ScopedDataAggregator::new(backend.clone());
        let dashboard = load_user_dashboard(&aggregator, &OrgTree::fixture())
            .await
            .unwrap();

        assert_eq!(dashboard.scope, InsightScope::node(3));
        assert_eq!(dashboard.summary.incident_count, 1);
        assert_eq!(dashboard.summary.financial_loss, 1_200);
        let actions: Vec<i64> = dashboard.bundle.actions.iter().map(|a| a.record.id).collect();
        assert_eq!(actions, vec![20]);

        let requests = backend.requests().await;
        assert!(requests.contains(&"incidents?node_id=3".to_string()));
        assert!(requests.contains(&"actions?assigned_to=7".to_string()));
    }

    #[tokio::test]
    async fn test_user_dashboard_requires_login() {
        let aggregator = ScopedDataAggregator::new(Arc::new(backend(3)));
        let err = load_user_dashboard(&aggregator, &OrgTree::fixture())
            .await
            .unwrap_err();
        assert!(needs_login(&err));
    }

    #[tokio::test]
    async fn test_user_node_missing_from_tree() {
        let backend = Arc::new(backend(42));
        login(backend.as_ref(), &Session::new(), "alice", "P@ssw0rd")
            .await
            .unwrap();

        let aggregator = ScopedDataAggregator::new(backend);
        let err = load_user_dashboard(&aggregator, &OrgTree::fixture())
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::NodeNotFound(42)));
    }
}
