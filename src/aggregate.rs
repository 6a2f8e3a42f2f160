//! Scoped data aggregation
//!
//! Fetches the four record collections for a scope concurrently, decides
//! which records belong to it and summarizes the result.
//!
//! Membership is decided per record from its anchor node:
//! - anchored at a node in the tree and inside the scope: kept
//! - anchored at a node in the tree but outside the scope: excluded
//! - anchor missing or unknown to the tree: kept and flagged `orphaned`
//! - insights anchored at the global marker: kept
//!
//! Records are never dropped for failing to resolve; only records positively
//! known to sit elsewhere in the tree are excluded.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Collection, PartialLoadError, Result, TransportError};
use crate::scope::InsightScope;
use crate::transport::RiskBackend;
use crate::tree::OrgTree;
use crate::types::{ActionItem, AiInsight, Incident, NodeId, Risk, UserId};

/// How risks are scoped.
///
/// The risks endpoint takes no node filter, so by default every risk is
/// returned and reported under the global scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskScoping {
    /// All risks, regardless of the selected scope
    #[default]
    Unscoped,
    /// Filter risks by their `node_id` like incidents
    ClientSide,
}

#[derive(Debug, Clone, Default)]
pub struct AggregatorConfig {
    pub risk_scoping: RiskScoping,
}

/// What to fetch: a scope plus an optional action assignee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeQuery {
    pub scope: InsightScope,
    /// When set, actions are fetched and kept by assignee instead of by node
    pub assignee: Option<UserId>,
}

impl ScopeQuery {
    pub fn new(scope: InsightScope) -> Self {
        Self {
            scope,
            assignee: None,
        }
    }

    pub fn assigned_to(mut self, user_id: UserId) -> Self {
        self.assignee = Some(user_id);
        self
    }
}

impl From<InsightScope> for ScopeQuery {
    fn from(scope: InsightScope) -> Self {
        Self::new(scope)
    }
}

/// A record with its scope membership.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scoped<T> {
    #[serde(flatten)]
    pub record: T,
    /// Anchor did not resolve to a node in the loaded tree
    pub orphaned: bool,
    /// Node the record was attributed to, when it resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_node: Option<NodeId>,
}

/// Records in scope for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopedBundle {
    pub scope: InsightScope,
    /// Scope the risks were filtered by (global unless client-side scoping)
    pub risk_scope: InsightScope,
    pub risks: Vec<Scoped<Risk>>,
    pub incidents: Vec<Scoped<Incident>>,
    pub actions: Vec<Scoped<ActionItem>>,
    pub insights: Vec<Scoped<AiInsight>>,
}

/// Unfiltered collections as returned by the backend.
#[derive(Debug, Clone, Default)]
pub struct RawRecords {
    pub risks: Vec<Risk>,
    pub incidents: Vec<Incident>,
    pub actions: Vec<ActionItem>,
    pub insights: Vec<AiInsight>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrphanCounts {
    pub risks: usize,
    pub incidents: usize,
    pub actions: usize,
    pub insights: usize,
}

impl OrphanCounts {
    pub fn total(&self) -> usize {
        self.risks + self.incidents + self.actions + self.insights
    }
}

/// Per-node record counts for rollup views.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeTally {
    pub risks: usize,
    pub incidents: usize,
    pub actions: usize,
}

/// Aggregate figures for a bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub incident_count: usize,
    pub risk_count: usize,
    pub action_count: usize,
    pub insight_count: usize,
    pub insight_texts: Vec<String>,
    pub orphans: OrphanCounts,
    /// Non-orphaned risks, incidents and actions by node
    pub per_node: BTreeMap<NodeId, NodeTally>,
    /// Sum of `loss_amount` over financial incidents, saturating at the `i64` bounds
    pub financial_loss: i64,
}

/// Fetches and scopes records through a [`RiskBackend`].
pub struct ScopedDataAggregator<B: RiskBackend + ?Sized> {
    backend: Arc<B>,
    config: AggregatorConfig,
}

impl<B: RiskBackend + ?Sized> ScopedDataAggregator<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_config(backend, AggregatorConfig::default())
    }

    pub fn with_config(backend: Arc<B>, config: AggregatorConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Fetch every collection for `query` and scope the results.
    ///
    /// The four requests run concurrently and all of them are awaited. If
    /// any fail, the error lists each failed collection.
    pub async fn fetch_scoped(&self, tree: &OrgTree, query: &ScopeQuery) -> Result<ScopedBundle> {
        query.scope.validate(tree)?;

        // Only a single-node scope maps onto the API's node filter.
        let node_filter = query.scope.single_node();
        debug!(scope = %query.scope, ?node_filter, assignee = ?query.assignee, "Fetching scoped records");

        let (risks, incidents, actions, insights) = tokio::join!(
            self.backend.list_risks(),
            self.backend.list_incidents(node_filter),
            self.backend.list_action_items(query.assignee),
            self.backend.list_insights(node_filter),
        );

        let mut failures = Vec::new();
        let raw = RawRecords {
            risks: take_records(Collection::Risks, risks, &mut failures),
            incidents: take_records(Collection::Incidents, incidents, &mut failures),
            actions: take_records(Collection::Actions, actions, &mut failures),
            insights: take_records(Collection::Insights, insights, &mut failures),
        };

        if !failures.is_empty() {
            let err = PartialLoadError { failures };
            warn!(scope = %query.scope, error = %err, "Scoped fetch incomplete");
            return Err(err.into());
        }

        let bundle = assemble(tree, query, self.config.risk_scoping, raw);
        let orphans = count_orphans(&bundle);
        if orphans.total() > 0 {
            warn!(
                scope = %query.scope,
                risks = orphans.risks,
                incidents = orphans.incidents,
                actions = orphans.actions,
                insights = orphans.insights,
                "Records reference nodes outside the loaded hierarchy"
            );
        }
        info!(
            scope = %query.scope,
            risks = bundle.risks.len(),
            incidents = bundle.incidents.len(),
            actions = bundle.actions.len(),
            insights = bundle.insights.len(),
            "Fetched scoped records"
        );

        Ok(bundle)
    }

    /// Fetch a single risk for its detail view.
    pub async fn fetch_risk(&self, id: i64) -> Result<Risk> {
        Ok(self.backend.get_risk(id).await?)
    }
}

fn take_records<T>(
    collection: Collection,
    result: std::result::Result<Vec<T>, TransportError>,
    failures: &mut Vec<(Collection, TransportError)>,
) -> Vec<T> {
    match result {
        Ok(records) => records,
        Err(e) => {
            failures.push((collection, e));
            Vec::new()
        }
    }
}

/// Where a record claims to belong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    Global,
    Node(NodeId),
    Unresolved,
}

impl From<Option<NodeId>> for Anchor {
    fn from(node_id: Option<NodeId>) -> Self {
        node_id.map_or(Anchor::Unresolved, Anchor::Node)
    }
}

/// Decide membership for one record. `None` means excluded.
fn place<T>(record: T, anchor: Anchor, tree: &OrgTree, scope: &InsightScope) -> Option<Scoped<T>> {
    match anchor {
        Anchor::Global => Some(Scoped {
            record,
            orphaned: false,
            resolved_node: None,
        }),
        Anchor::Node(id) if tree.contains(id) => scope.contains(id).then_some(Scoped {
            record,
            orphaned: false,
            resolved_node: Some(id),
        }),
        Anchor::Node(_) | Anchor::Unresolved => Some(Scoped {
            record,
            orphaned: true,
            resolved_node: None,
        }),
    }
}

/// Resolve an insight's scope label: `global`, a node id (`3` or `node:3`),
/// or a node name that matches exactly one node.
///
/// A numeric label names a node by id when that id is in the tree, and
/// otherwise falls back to a name match (a node called "2024").
fn insight_anchor(tree: &OrgTree, label: &str) -> Anchor {
    let label = label.trim();
    if label.eq_ignore_ascii_case("global") {
        return Anchor::Global;
    }

    let id_text = label.strip_prefix("node:").unwrap_or(label).trim();
    let id = id_text.parse::<NodeId>().ok();
    if let Some(id) = id.filter(|id| tree.contains(*id)) {
        return Anchor::Node(id);
    }

    let mut named = tree.preorder().filter(|(_, node)| node.name == label);
    match (named.next(), named.next()) {
        (Some((_, node)), None) => Anchor::Node(node.id),
        _ => id.map_or(Anchor::Unresolved, Anchor::Node),
    }
}

/// Scope raw collections into a bundle. Pure; `fetch_scoped` delegates here.
pub fn assemble(
    tree: &OrgTree,
    query: &ScopeQuery,
    risk_scoping: RiskScoping,
    raw: RawRecords,
) -> ScopedBundle {
    let scope = &query.scope;
    let risk_scope = match risk_scoping {
        RiskScoping::Unscoped => InsightScope::Global,
        RiskScoping::ClientSide => scope.clone(),
    };

    // Actions without a node of their own inherit their risk's.
    let risk_nodes: HashMap<i64, Option<NodeId>> =
        raw.risks.iter().map(|r| (r.id, r.node_id)).collect();

    // Assignee-scoped actions are kept wherever they sit.
    let action_scope = match query.assignee {
        Some(_) => InsightScope::Global,
        None => scope.clone(),
    };

    let actions = raw
        .actions
        .into_iter()
        .filter_map(|action| {
            let node = action
                .node_id
                .or_else(|| action.risk_id.and_then(|id| risk_nodes.get(&id).copied().flatten()));
            place(action, node.into(), tree, &action_scope)
        })
        .collect();

    let risks = raw
        .risks
        .into_iter()
        .filter_map(|risk| {
            let anchor = risk.node_id.into();
            place(risk, anchor, tree, &risk_scope)
        })
        .collect();

    let incidents = raw
        .incidents
        .into_iter()
        .filter_map(|incident| {
            let anchor = incident.node_id.into();
            place(incident, anchor, tree, scope)
        })
        .collect();

    let insights = raw
        .insights
        .into_iter()
        .filter_map(|insight| {
            let anchor = insight_anchor(tree, &insight.scope);
            place(insight, anchor, tree, scope)
        })
        .collect();

    ScopedBundle {
        scope: scope.clone(),
        risk_scope,
        risks,
        incidents,
        actions,
        insights,
    }
}

fn count_orphans(bundle: &ScopedBundle) -> OrphanCounts {
    fn orphaned<T>(records: &[Scoped<T>]) -> usize {
        records.iter().filter(|r| r.orphaned).count()
    }

    OrphanCounts {
        risks: orphaned(&bundle.risks),
        incidents: orphaned(&bundle.incidents),
        actions: orphaned(&bundle.actions),
        insights: orphaned(&bundle.insights),
    }
}

/// Summarize a bundle. Pure: the same bundle always yields the same summary.
pub fn summarize(bundle: &ScopedBundle) -> Summary {
    let mut per_node: BTreeMap<NodeId, NodeTally> = BTreeMap::new();

    for node in bundle.risks.iter().filter_map(|r| r.resolved_node) {
        per_node.entry(node).or_default().risks += 1;
    }
    for node in bundle.incidents.iter().filter_map(|i| i.resolved_node) {
        per_node.entry(node).or_default().incidents += 1;
    }
    for node in bundle.actions.iter().filter_map(|a| a.resolved_node) {
        per_node.entry(node).or_default().actions += 1;
    }

    Summary {
        incident_count: bundle.incidents.len(),
        risk_count: bundle.risks.len(),
        action_count: bundle.actions.len(),
        insight_count: bundle.insights.len(),
        insight_texts: bundle
            .insights
            .iter()
            .filter_map(|i| i.record.display_text())
            .collect(),
        orphans: count_orphans(bundle),
        per_node,
        financial_loss: bundle
            .incidents
            .iter()
            .filter_map(|i| i.record.financial_loss())
            .fold(0i64, i64::saturating_add),
    }
}
