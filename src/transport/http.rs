//! HTTP backend for the RiskWrapped REST API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::traits::RiskBackend;
use crate::config::{DashboardConfig, HierarchySource};
use crate::error::TransportError;
use crate::session::Session;
use crate::tree;
use crate::types::{
    ActionItem, AiInsight, HealthStatus, HierarchyPayload, Incident, NodeId, Risk, TokenResponse,
    User, UserId,
};

/// Upper bound on pages fetched for one listing.
const MAX_PAGES: u32 = 10_000;

/// REST client for the RiskWrapped API.
///
/// Every request carries `Authorization: Bearer <token>` when the injected
/// [`Session`] holds a token.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    page_size: u32,
    hierarchy: HierarchySource,
    session: Session,
}

impl HttpBackend {
    /// Create a backend from configuration and a session handle.
    pub fn new(config: &DashboardConfig, session: Session) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            page_size: config.page_size,
            hierarchy: config.hierarchy.clone(),
            session,
        })
    }

    /// The session this backend authenticates with.
    pub fn session(&self) -> &Session {
        &self.session
    }

    fn url(&self, path: &str, params: &[String]) -> String {
        let mut url = format!("{}{}", self.base_url, path);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        url
    }

    async fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.token().await {
            Some(token) => request.header(header::AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[String],
    ) -> Result<T, TransportError> {
        let url = self.url(path, params);
        debug!(%url, "GET");

        let request = self.authorize(self.client.get(&url)).await;
        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// Fetch every page of a `skip`/`limit` listing.
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[String],
        page_size: u32,
    ) -> Result<Vec<T>, TransportError> {
        let mut records: Vec<T> = Vec::new();

        for page in 0..MAX_PAGES {
            let skip = u64::from(page) * u64::from(page_size);
            let mut page_params = params.to_vec();
            page_params.push(format!("skip={}", skip));
            page_params.push(format!("limit={}", page_size));

            let batch: Vec<T> = self.get_json(path, &page_params).await?;
            let received = batch.len();
            records.extend(batch);

            // A short page ends the listing; a long one means `limit` was ignored.
            if received != page_size as usize {
                debug!(path, pages = page + 1, records = records.len(), "Fetched listing");
                return Ok(records);
            }
        }

        Err(TransportError::Decode(format!(
            "{} listing exceeded {} pages",
            path, MAX_PAGES
        )))
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(TransportError::NotFound(response.url().path().to_string()));
        }

        if status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Unauthorized(body));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl RiskBackend for HttpBackend {
    async fn login(&self, username: &str, password: &str) -> Result<TokenResponse, TransportError> {
        let url = self.url("/token", &[]);
        debug!(%url, username, "POST");

        let response = self
            .client
            .post(&url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;

        self.handle_response(response).await
    }

    async fn current_user(&self) -> Result<User, TransportError> {
        self.get_json("/users/me", &[]).await
    }

    async fn fetch_hierarchy(&self) -> Result<HierarchyPayload, TransportError> {
        match &self.hierarchy {
            HierarchySource::Static => Ok(HierarchyPayload::Nested(tree::fixture_payload())),
            HierarchySource::Nested { path } => {
                Ok(HierarchyPayload::Nested(self.get_json(path, &[]).await?))
            }
            HierarchySource::Flat { path, page_size } => {
                let nodes: Vec<Value> = self.get_all(path, &[], *page_size).await?;
                Ok(HierarchyPayload::Flat(Value::Array(nodes)))
            }
        }
    }

    async fn list_risks(&self) -> Result<Vec<Risk>, TransportError> {
        self.get_all("/risks", &[], self.page_size).await
    }

    async fn get_risk(&self, id: i64) -> Result<Risk, TransportError> {
        self.get_json(&format!("/risks/{}", id), &[]).await
    }

    async fn list_incidents(&self, node_id: Option<NodeId>) -> Result<Vec<Incident>, TransportError> {
        let params: Vec<String> = node_id.map(|id| format!("node_id={}", id)).into_iter().collect();
        self.get_all("/incidents", &params, self.page_size).await
    }

    async fn list_action_items(
        &self,
        assigned_to: Option<UserId>,
    ) -> Result<Vec<ActionItem>, TransportError> {
        let params: Vec<String> = assigned_to
            .map(|id| format!("assigned_to={}", id))
            .into_iter()
            .collect();
        self.get_all("/action_items", &params, self.page_size).await
    }

    async fn list_insights(&self, node_id: Option<NodeId>) -> Result<Vec<AiInsight>, TransportError> {
        let params: Vec<String> = node_id.map(|id| format!("node_id={}", id)).into_iter().collect();
        self.get_all("/insights", &params, self.page_size).await
    }

    async fn health(&self) -> Result<HealthStatus, TransportError> {
        self.get_json("/health", &[]).await
    }
}
