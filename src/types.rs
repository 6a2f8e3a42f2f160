//! Domain records returned by the RiskWrapped API

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

/// Organization node identifier
pub type NodeId = i64;

/// User identifier
pub type UserId = i64;

/// A risk registered against an organizational node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Nullable: the backend does not guarantee a node for every risk
    #[serde(default)]
    pub node_id: Option<NodeId>,
    #[serde(default)]
    pub risk_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<NaiveDateTime>,
}

/// An incident recorded against an organizational node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub root_cause: Option<String>,
    /// Only meaningful when `is_financial` is set
    #[serde(default)]
    pub loss_amount: Option<i64>,
    #[serde(default)]
    pub is_financial: bool,
    #[serde(default)]
    pub node_id: Option<NodeId>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<NaiveDateTime>,
}

impl Incident {
    /// Loss amount, if this is a financial incident.
    pub fn financial_loss(&self) -> Option<i64> {
        if self.is_financial {
            self.loss_amount
        } else {
            None
        }
    }
}

/// A remediation action assigned to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub id: i64,
    pub description: String,
    #[serde(default)]
    pub risk_id: Option<i64>,
    pub assigned_to: UserId,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub due_date: Option<NaiveDateTime>,
    /// Not always sent; falls back to the linked risk's node
    #[serde(default)]
    pub node_id: Option<NodeId>,
}

/// AI-generated insight text for an organizational scope.
///
/// Every text field is optional; the backend may omit any subset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiInsight {
    /// Node id, node name, or the global marker
    #[serde(default)]
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_insight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_insight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_insight: Option<String>,
}

impl AiInsight {
    /// Display text: `insight` when present, otherwise the category
    /// fields (risk, incident, action) joined with a space.
    pub fn display_text(&self) -> Option<String> {
        if let Some(text) = non_empty(&self.insight) {
            return Some(text.to_string());
        }

        let parts: Vec<&str> = [
            &self.risk_insight,
            &self.incident_insight,
            &self.action_insight,
        ]
        .into_iter()
        .filter_map(non_empty)
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Authenticated user profile (`/users/me`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    /// Anchors the user's default dashboard scope
    pub node_id: NodeId,
    #[serde(default)]
    pub level: Option<i32>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Response from `POST /token`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Response from `GET /health`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub db: bool,
    #[serde(default)]
    pub ai: bool,
}

/// Raw hierarchy payload as served by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum HierarchyPayload {
    /// Single nested tree: `{id, name, children: [...]}`
    Nested(serde_json::Value),
    /// Flat node listing: `[{id, name, parent_id}]`
    Flat(serde_json::Value),
}

/// Parse a backend timestamp (naive ISO-8601 or RFC 3339).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    raw.parse::<NaiveDateTime>()
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc()))
}

// Unparseable timestamps decode as absent rather than failing the record.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}
