//! Per-table route reconciliation

use parking_lot::RwLock;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::provider::{InstanceIdentity, ProviderError, RouteProvider};

/// What a reconciliation pass did to a single table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    /// No default route existed; one was installed
    Created,
    /// A default route pointed elsewhere; it was repointed at this instance
    Replaced,
    /// The default route already points at this instance
    Unchanged,
    /// The table could not be reconciled this pass
    Failed(String),
}

/// Outcome for one table in one pass.
///
/// Used for logging and the admin surface only; never retained across
/// passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub table_id: String,
    pub action: ReconcileAction,
}

impl ReconcileOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.action, ReconcileAction::Failed(_))
    }
}

/// Most recent pass outcomes, shared with the admin surface
#[derive(Default)]
pub struct OutcomeBoard {
    latest: RwLock<Vec<ReconcileOutcome>>,
}

impl OutcomeBoard {
    pub fn publish(&self, outcomes: Vec<ReconcileOutcome>) {
        *self.latest.write() = outcomes;
    }

    pub fn latest(&self) -> Vec<ReconcileOutcome> {
        self.latest.read().clone()
    }
}

/// Guarantees every owned route table has a default route targeting this
/// instance's network interface
pub struct Reconciler {
    provider: Arc<dyn RouteProvider>,
    identity: InstanceIdentity,
    table_ids: Vec<String>,
    call_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        provider: Arc<dyn RouteProvider>,
        identity: InstanceIdentity,
        table_ids: Vec<String>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            identity,
            table_ids,
            call_timeout,
        }
    }

    /// Run one pass over every owned table.
    ///
    /// Tables are handled sequentially inside the pass, so state
    /// transitions for a single table are never concurrent. A failing
    /// table does not abort the remainder of the pass.
    pub async fn run_pass(&self) -> Vec<ReconcileOutcome> {
        let mut outcomes = Vec::with_capacity(self.table_ids.len());
        for table_id in &self.table_ids {
            let action = match self.reconcile_table(table_id).await {
                Ok(action) => {
                    match &action {
                        ReconcileAction::Created => info!(
                            table = %table_id,
                            interface = %self.identity.interface_id,
                            "Installed default route"
                        ),
                        ReconcileAction::Replaced => info!(
                            table = %table_id,
                            interface = %self.identity.interface_id,
                            "Repointed default route at this instance"
                        ),
                        ReconcileAction::Unchanged => debug!(
                            table = %table_id,
                            "Default route already points at this instance"
                        ),
                        ReconcileAction::Failed(_) => {}
                    }
                    action
                }
                Err(err) => {
                    // Permission faults usually need an operator fix, so they
                    // get the loudest level the loop emits.
                    if matches!(err, ProviderError::PermissionDenied(_)) {
                        error!(table = %table_id, error = %err, "Reconciliation denied");
                    } else if err.is_transient() {
                        warn!(table = %table_id, error = %err, "Reconciliation failed, retrying next pass");
                    } else {
                        warn!(table = %table_id, error = %err, "Reconciliation failed");
                    }
                    ReconcileAction::Failed(err.to_string())
                }
            };
            outcomes.push(ReconcileOutcome {
                table_id: table_id.clone(),
                action,
            });
        }
        outcomes
    }

    /// Reconcile a single table from freshly read provider state
    async fn reconcile_table(
        &self,
        table_id: &str,
    ) -> std::result::Result<ReconcileAction, ProviderError> {
        let state = self
            .bounded(self.provider.describe_route_table(table_id))
            .await?;

        match state.default_route_target.as_deref() {
            Some(target) if target == self.identity.interface_id => Ok(ReconcileAction::Unchanged),
            Some(_) => {
                self.bounded(
                    self.provider
                        .replace_default_route(table_id, &self.identity.interface_id),
                )
                .await?;
                Ok(ReconcileAction::Replaced)
            }
            None => {
                self.bounded(
                    self.provider
                        .create_default_route(table_id, &self.identity.interface_id),
                )
                .await?;
                Ok(ReconcileAction::Created)
            }
        }
    }

    /// Bound a provider call so a stuck request cannot stall the pass
    async fn bounded<T, F>(&self, fut: F) -> std::result::Result<T, ProviderError>
    where
        F: Future<Output = std::result::Result<T, ProviderError>>,
    {
        match timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(format!(
                "no response within {}s",
                self.call_timeout.as_secs()
            ))),
        }
    }
}
