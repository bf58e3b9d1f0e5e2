// ABOUTME: Single-use plan handles over a plan/apply engine.
// ABOUTME: Tracks which change-sets this run issued and which were already applied.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

use super::{
    ApplyError, ApplySummary, DeploymentOutputs, OutputsError, PlanApplyEngine, PlanDiff,
    PlanError, PlanSummary, ResourceGraph,
};
use crate::types::{PlanId, RunId};

/// Opaque reference to a computed change-set.
///
/// Valid only with the adapter that issued it, and only until it is applied.
/// Cloning does not extend its validity: a second apply of any clone fails
/// with [`ApplyError::StaleHandle`].
#[derive(Debug, Clone)]
pub struct PlanHandle {
    id: PlanId,
    run: RunId,
    diff: Arc<PlanDiff>,
}

impl PlanHandle {
    pub fn id(&self) -> PlanId {
        self.id
    }

    pub fn diff(&self) -> &PlanDiff {
        &self.diff
    }

    pub fn summary(&self) -> PlanSummary {
        self.diff.summary()
    }
}

#[derive(Debug, Default)]
struct HandleLedger {
    issued: HashSet<PlanId>,
    consumed: HashSet<PlanId>,
}

/// Wraps an engine's plan → apply lifecycle with handle bookkeeping.
pub struct PlanApplyAdapter {
    engine: Box<dyn PlanApplyEngine>,
    run: RunId,
    ledger: Mutex<HandleLedger>,
}

impl std::fmt::Debug for PlanApplyAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanApplyAdapter")
            .field("run", &self.run)
            .finish()
    }
}

impl PlanApplyAdapter {
    pub fn new(engine: Box<dyn PlanApplyEngine>, run: RunId) -> Self {
        Self {
            engine,
            run,
            ledger: Mutex::new(HandleLedger::default()),
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run
    }

    /// Compute a change-set for `graph` and issue a handle for it.
    pub async fn plan(&self, graph: &ResourceGraph) -> Result<PlanHandle, PlanError> {
        let diff = self.engine.plan(graph).await?;
        let handle = PlanHandle {
            id: PlanId::generate(),
            run: self.run,
            diff: Arc::new(diff),
        };
        self.ledger.lock().issued.insert(handle.id);
        tracing::info!(
            plan = %handle.id.short(),
            "Planned: {}",
            handle.summary()
        );
        Ok(handle)
    }

    /// Apply a change-set. The handle is spent whether or not apply succeeds.
    pub async fn apply(&self, handle: PlanHandle) -> Result<ApplySummary, ApplyError> {
        {
            let mut ledger = self.ledger.lock();
            if handle.run != self.run || !ledger.issued.contains(&handle.id) {
                return Err(ApplyError::StaleHandle(handle.id));
            }
            if !ledger.consumed.insert(handle.id) {
                return Err(ApplyError::StaleHandle(handle.id));
            }
        }

        tracing::info!(plan = %handle.id.short(), "Applying change-set");
        self.engine.apply(&handle.diff).await
    }

    pub async fn outputs(&self) -> Result<DeploymentOutputs, OutputsError> {
        self.engine.outputs().await
    }
}
