//! Node selection state machine
//!
//! Owns the loaded hierarchy and the currently displayed view. Every
//! selection takes a generation ticket; a fetch result is published only
//! while its ticket is still the latest, so a slow response for an earlier
//! selection can never overwrite a later one.
//!
//! ```text
//! Idle -> TreeLoading -> TreeReady | TreeError
//! TreeReady -> Loading{node} -> Ready{node, view} | Error{node, error}
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::aggregate::{summarize, ScopeQuery, ScopedBundle, ScopedDataAggregator, Summary};
use crate::error::DashboardError;
use crate::scope::{self, InsightScope, ScopeMode};
use crate::transport::RiskBackend;
use crate::tree::OrgTree;
use crate::types::NodeId;

/// An aggregated view for one selection. Shared read-only once published.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopedView {
    pub scope: InsightScope,
    pub bundle: ScopedBundle,
    pub summary: Summary,
}

/// Published controller state.
#[derive(Debug, Clone)]
pub enum SelectionState {
    Idle,
    TreeLoading,
    TreeError(Arc<DashboardError>),
    TreeReady,
    Loading {
        node: NodeId,
        mode: ScopeMode,
    },
    Ready {
        node: NodeId,
        mode: ScopeMode,
        view: Arc<ScopedView>,
    },
    Error {
        node: NodeId,
        mode: ScopeMode,
        error: Arc<DashboardError>,
    },
}

impl SelectionState {
    /// The selected node, if any.
    pub fn selected(&self) -> Option<NodeId> {
        match self {
            SelectionState::Loading { node, .. }
            | SelectionState::Ready { node, .. }
            | SelectionState::Error { node, .. } => Some(*node),
            _ => None,
        }
    }

    /// The displayed view, if a fetch has completed for the selection.
    pub fn view(&self) -> Option<&Arc<ScopedView>> {
        match self {
            SelectionState::Ready { view, .. } => Some(view),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            SelectionState::TreeLoading | SelectionState::Loading { .. }
        )
    }
}

/// Result of a selection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The result was published
    Applied,
    /// A later request replaced this one; its result was discarded
    Superseded,
}

pub struct SelectionController<B: RiskBackend + ?Sized> {
    aggregator: ScopedDataAggregator<B>,
    tree: RwLock<Option<Arc<OrgTree>>>,
    state: watch::Sender<SelectionState>,
    generation: AtomicU64,
}

impl<B: RiskBackend + ?Sized> SelectionController<B> {
    pub fn new(aggregator: ScopedDataAggregator<B>) -> Self {
        let (state, _) = watch::channel(SelectionState::Idle);
        Self {
            aggregator,
            tree: RwLock::new(None),
            state,
            generation: AtomicU64::new(0),
        }
    }

    pub fn aggregator(&self) -> &ScopedDataAggregator<B> {
        &self.aggregator
    }

    /// Receive every state change.
    pub fn subscribe(&self) -> watch::Receiver<SelectionState> {
        self.state.subscribe()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SelectionState {
        self.state.borrow().clone()
    }

    pub async fn tree(&self) -> Option<Arc<OrgTree>> {
        self.tree.read().await.clone()
    }

    /// Fetch the hierarchy and replace the loaded tree.
    ///
    /// Invalidates any in-flight selection. Selections made while the load
    /// is running wait for it and then use the new tree.
    pub async fn load_tree(&self) -> Result<Arc<OrgTree>, Arc<DashboardError>> {
        let mut slot = self.tree.write().await;
        let ticket = self.next_ticket();
        self.publish(ticket, SelectionState::TreeLoading);

        match OrgTree::load(self.aggregator.backend().as_ref()).await {
            Ok(tree) => {
                let tree = Arc::new(tree);
                *slot = Some(tree.clone());
                self.publish(ticket, SelectionState::TreeReady);
                Ok(tree)
            }
            Err(e) => {
                let error = Arc::new(e);
                warn!(error = %error, "Failed to load org hierarchy");
                self.publish(ticket, SelectionState::TreeError(error.clone()));
                Err(error)
            }
        }
    }

    /// Install an already built tree.
    pub async fn set_tree(&self, tree: OrgTree) {
        let ticket = self.next_ticket();
        *self.tree.write().await = Some(Arc::new(tree));
        self.publish(ticket, SelectionState::TreeReady);
    }

    /// Select a node and fetch its view.
    ///
    /// Moves to `Loading` at once; the fetched view (or error) is published
    /// only if no other selection was made in the meantime.
    pub async fn select(&self, node: NodeId, mode: ScopeMode) -> SelectOutcome {
        let ticket = self.next_ticket();

        let Some(tree) = self.tree().await else {
            return self.publish(
                ticket,
                SelectionState::Error {
                    node,
                    mode,
                    error: Arc::new(DashboardError::TreeNotLoaded),
                },
            );
        };

        let scope = match scope::resolve(&tree, node, mode) {
            Ok(scope) => scope,
            Err(e) => {
                debug!(node, error = %e, "Rejected selection");
                return self.publish(
                    ticket,
                    SelectionState::Error {
                        node,
                        mode,
                        error: Arc::new(e),
                    },
                );
            }
        };

        if self.publish(ticket, SelectionState::Loading { node, mode }) == SelectOutcome::Superseded {
            return SelectOutcome::Superseded;
        }

        let query = ScopeQuery::new(scope.clone());
        let next = match self.aggregator.fetch_scoped(&tree, &query).await {
            Ok(bundle) => {
                let summary = summarize(&bundle);
                SelectionState::Ready {
                    node,
                    mode,
                    view: Arc::new(ScopedView {
                        scope,
                        bundle,
                        summary,
                    }),
                }
            }
            Err(e) => SelectionState::Error {
                node,
                mode,
                error: Arc::new(e),
            },
        };

        let outcome = self.publish(ticket, next);
        match outcome {
            SelectOutcome::Applied => info!(node, ?mode, "Selection loaded"),
            SelectOutcome::Superseded => warn!(node, ?mode, "Discarded result of superseded selection"),
        }
        outcome
    }

    /// Drop the selection and return to the tree view.
    pub async fn clear_selection(&self) {
        let ticket = self.next_ticket();
        let next = if self.tree().await.is_some() {
            SelectionState::TreeReady
        } else {
            SelectionState::Idle
        };
        self.publish(ticket, next);
    }

    fn next_ticket(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    // The generation check runs under the channel's write lock, so a newer
    // selection's state can never be overwritten by an older ticket.
    fn publish(&self, ticket: u64, next: SelectionState) -> SelectOutcome {
        let generation = &self.generation;
        let applied = self.state.send_if_modified(move |current| {
            if generation.load(Ordering::SeqCst) != ticket {
                return false;
            }
            *current = next;
            true
        });

        if applied {
            SelectOutcome::Applied
        } else {
            SelectOutcome::Superseded
        }
    }
}

impl<B: RiskBackend + ?Sized + 'static> SelectionController<B> {
    /// Run [`SelectionController::select`] on a spawned task.
    pub fn select_in_background(
        self: &Arc<Self>,
        node: NodeId,
        mode: ScopeMode,
    ) -> JoinHandle<SelectOutcome> {
        let controller = Arc::clone(self);
        tokio::spawn(async move { controller.select(node, mode).await })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::Collection;
    use crate::transport::MockBackend;
    use crate::types::Incident;

    fn incident(id: i64, node_id: NodeId) -> Incident {
        Incident {
            id,
            name: format!("Incident {}", id),
            description: None,
            root_cause: None,
            loss_amount: None,
            is_financial: false,
            node_id: Some(node_id),
            created_at: None,
        }
    }

    fn controller(backend: MockBackend) -> Arc<SelectionController<MockBackend>> {
        Arc::new(SelectionController::new(ScopedDataAggregator::new(Arc::new(
            backend,
        ))))
    }

    fn incident_ids(state: &SelectionState) -> Vec<i64> {
        state
            .view()
            .map(|v| v.bundle.incidents.iter().map(|i| i.record.id).collect())
            .unwrap_or_default()
    }

    // ==========================================================================
    // Tree lifecycle
    // ==========================================================================

    #[tokio::test]
    async fn test_load_tree() {
        let controller = controller(MockBackend::new());
        assert!(matches!(controller.state(), SelectionState::Idle));

        let tree = controller.load_tree().await.unwrap();
        assert_eq!(tree.len(), 6);
        assert!(matches!(controller.state(), SelectionState::TreeReady));
    }

    #[tokio::test]
    async fn test_tree_error() {
        let backend = MockBackend::new();
        backend.set_hierarchy_unavailable(true).await;
        let controller = controller(backend);

        assert!(controller.load_tree().await.is_err());
        assert!(matches!(controller.state(), SelectionState::TreeError(_)));
        assert!(controller.tree().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_during_tree_load_waits_for_tree() {
        let controller = controller(
            MockBackend::new()
                .with_incidents(vec![incident(10, 3)])
                .with_hierarchy_latency(Duration::from_millis(500)),
        );

        let loading = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.load_tree().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(matches!(controller.state(), SelectionState::TreeLoading));

        let outcome = controller.select(3, ScopeMode::SelfOnly).await;
        assert_eq!(outcome, SelectOutcome::Applied);
        assert!(loading.await.unwrap().is_ok());

        let state = controller.state();
        assert!(matches!(state, SelectionState::Ready { node: 3, .. }));
        assert_eq!(incident_ids(&state), vec![10]);
    }

    #[tokio::test]
    async fn test_select_before_tree_loaded() {
        let controller = controller(MockBackend::new());
        controller.select(3, ScopeMode::SelfOnly).await;

        match controller.state() {
            SelectionState::Error { node, error, .. } => {
                assert_eq!(node, 3);
                assert!(matches!(*error, DashboardError::TreeNotLoaded));
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    // ==========================================================================
    // Selection
    // ==========================================================================

    #[tokio::test]
    async fn test_select_publishes_view() {
        let controller = controller(
            MockBackend::new().with_incidents(vec![incident(10, 3), incident(11, 5)]),
        );
        controller.load_tree().await.unwrap();

        let outcome = controller.select(2, ScopeMode::SelfAndDescendants).await;
        assert_eq!(outcome, SelectOutcome::Applied);

        let state = controller.state();
        assert_eq!(state.selected(), Some(2));
        assert_eq!(incident_ids(&state), vec![10]);
        assert_eq!(state.view().unwrap().summary.incident_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_node_keeps_previous_view_intact() {
        let controller = controller(MockBackend::new().with_incidents(vec![incident(10, 3)]));
        controller.load_tree().await.unwrap();
        controller.select(3, ScopeMode::SelfOnly).await;

        let previous = controller.state().view().cloned().unwrap();
        let snapshot = (*previous).clone();

        controller.select(99, ScopeMode::SelfOnly).await;
        match controller.state() {
            SelectionState::Error { node, error, .. } => {
                assert_eq!(node, 99);
                assert!(matches!(*error, DashboardError::NodeNotFound(99)));
            }
            other => panic!("unexpected state {:?}", other),
        }
        assert_eq!(*previous, snapshot);
    }

    #[tokio::test]
    async fn test_partial_load_becomes_error_state() {
        let backend = MockBackend::new();
        backend.fail(Collection::Insights).await;
        let controller = controller(backend);
        controller.load_tree().await.unwrap();

        controller.select(3, ScopeMode::SelfOnly).await;
        match controller.state() {
            SelectionState::Error { error, .. } => match &*error {
                DashboardError::PartialLoad(p) => assert_eq!(p.failed(), vec![Collection::Insights]),
                other => panic!("unexpected error {:?}", other),
            },
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_published_before_fetch_completes() {
        let controller = controller(
            MockBackend::new().with_latency(Collection::Incidents, Duration::from_secs(1)),
        );
        controller.load_tree().await.unwrap();
        let mut updates = controller.subscribe();

        let handle = controller.select_in_background(4, ScopeMode::SelfOnly);
        updates.changed().await.unwrap();
        assert!(matches!(
            *updates.borrow_and_update(),
            SelectionState::Loading { node: 4, .. }
        ));

        assert_eq!(handle.await.unwrap(), SelectOutcome::Applied);
        assert!(matches!(controller.state(), SelectionState::Ready { node: 4, .. }));
    }

    // ==========================================================================
    // Last selection wins
    // ==========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_slow_earlier_selection_is_discarded() {
        let controller = controller(
            MockBackend::new()
                .with_incidents(vec![incident(10, 3), incident(12, 4)])
                .with_node_latency(3, Duration::from_millis(500)),
        );
        controller.load_tree().await.unwrap();

        let first = controller.select_in_background(3, ScopeMode::SelfOnly);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = controller.select(4, ScopeMode::SelfOnly).await;
        assert_eq!(second, SelectOutcome::Applied);
        assert_eq!(incident_ids(&controller.state()), vec![12]);

        assert_eq!(first.await.unwrap(), SelectOutcome::Superseded);
        let state = controller.state();
        assert_eq!(state.selected(), Some(4));
        assert_eq!(incident_ids(&state), vec![12]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_result_never_replaces_later_loading() {
        let controller = controller(
            MockBackend::new()
                .with_incidents(vec![incident(10, 3), incident(12, 4)])
                .with_node_latency(3, Duration::from_millis(100))
                .with_node_latency(4, Duration::from_millis(1_000)),
        );
        controller.load_tree().await.unwrap();

        let first = controller.select_in_background(3, ScopeMode::SelfOnly);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = controller.select_in_background(4, ScopeMode::SelfOnly);

        assert_eq!(first.await.unwrap(), SelectOutcome::Superseded);
        assert!(matches!(
            controller.state(),
            SelectionState::Loading { node: 4, .. }
        ));

        assert_eq!(second.await.unwrap(), SelectOutcome::Applied);
        assert_eq!(incident_ids(&controller.state()), vec![12]);
    }

    #[tokio::test]
    async fn test_clear_selection() {
        let controller = controller(MockBackend::new());
        controller.load_tree().await.unwrap();
        controller.select(3, ScopeMode::SelfOnly).await;

        controller.clear_selection().await;
        assert!(matches!(controller.state(), SelectionState::TreeReady));
    }
}
