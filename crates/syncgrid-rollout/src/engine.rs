//! Rollout engine — tick-driven evaluation of active rollouts.
//!
//! The engine is invoked by a recurring scheduler (the `syncd` loop or an
//! external workflow engine). Each tick runs one evaluation step per
//! rollout: load the record, derive the health signal, apply the
//! controller transition, persist. Evaluations for the same actor
//! definition are serialized through a per-actor async mutex so a
//! percentage band is never advanced twice concurrently.
//!
//! I/O failures while deriving the health signal degrade it to Unknown:
//! the rollout holds in place and the tick is effectively retried on the
//! next scheduled invocation. Only sustained silence past the step-wait
//! budget turns into a terminal failure (the controller's timeout path).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{Mutex, RwLock, watch};
use tracing::{debug, error, info, warn};

use syncgrid_state::{
    ActorDefinitionId, ConnectorRollout, RolloutId, RolloutState, StateStore, WorkloadId,
};
use syncgrid_workload::{WorkloadApiClient, WorkloadStatus, WorkloadStatusOracle};

use crate::controller::{
    ControllerConfig, HealthSignal, NewRolloutParams, RolloutAction, RolloutController,
};
use crate::error::{RolloutError, RolloutResult};

/// Boxed future returned by engine callbacks.
pub type BoxFuture<T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send>>;

/// Pluggable health signal source, keyed by actor definition.
///
/// When unset, the engine derives the signal from the workload status
/// oracle over the rollout's tracked workloads.
pub type HealthSignalFn = Arc<dyn Fn(ActorDefinitionId) -> BoxFuture<HealthSignal> + Send + Sync>;

/// Wrap an async closure as a `HealthSignalFn`.
pub fn health_signal_fn<F, Fut>(f: F) -> HealthSignalFn
where
    F: Fn(ActorDefinitionId) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = HealthSignal> + Send + 'static,
{
    Arc::new(move |actor| Box::pin(f(actor)))
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minutes a step must run healthy before it can advance or finalize.
    pub health_confirmation_mins: u64,
    /// `source` tag attached to failure reports sent during rollback.
    pub failure_report_source: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            health_confirmation_mins: 10,
            failure_report_source: "rollout-engine".to_string(),
        }
    }
}

/// Result of one evaluation tick.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub rollout: ConnectorRollout,
    /// Side effect the caller must apply, if a transition produced one.
    pub action: Option<RolloutAction>,
}

/// Drives all active rollouts through their state machines.
pub struct RolloutEngine {
    state: StateStore,
    client: Arc<WorkloadApiClient>,
    oracle: WorkloadStatusOracle,
    controller: RolloutController,
    config: EngineConfig,
    /// Workloads observed per rollout: rollout_id → workload ids.
    tracked: RwLock<HashMap<RolloutId, Vec<WorkloadId>>>,
    /// Workloads whose failure has already been reported (or that were
    /// already terminal when rollback ran). Keeps `report_failure`
    /// single-shot per workload.
    reported: RwLock<HashSet<WorkloadId>>,
    /// Per-actor evaluation guards.
    actor_locks: RwLock<HashMap<ActorDefinitionId, Arc<Mutex<()>>>>,
    health_fn: Option<HealthSignalFn>,
}

impl RolloutEngine {
    /// Create an engine over the given store and workload client.
    pub fn new(state: StateStore, client: Arc<WorkloadApiClient>, config: EngineConfig) -> Self {
        let controller = RolloutController::new(ControllerConfig {
            health_confirmation_mins: config.health_confirmation_mins,
        });
        Self {
            state,
            oracle: WorkloadStatusOracle::new(client.clone()),
            client,
            controller,
            config,
            tracked: RwLock::new(HashMap::new()),
            reported: RwLock::new(HashSet::new()),
            actor_locks: RwLock::new(HashMap::new()),
            health_fn: None,
        }
    }

    /// Replace the oracle-derived health signal with a custom source.
    pub fn with_health_fn(mut self, f: HealthSignalFn) -> Self {
        self.health_fn = Some(f);
        self
    }

    // ── Operator surface ───────────────────────────────────────────

    /// Create a rollout. Rejects a second active rollout for the same
    /// actor definition.
    pub async fn create_rollout(
        &self,
        params: NewRolloutParams,
    ) -> RolloutResult<ConnectorRollout> {
        let actor = params.actor_definition_id;
        if self.state.active_rollout_for_actor(&actor)?.is_some() {
            return Err(RolloutError::ActiveRolloutExists(actor));
        }
        let rollout = self.controller.create(params, epoch_secs())?;
        self.state.insert_rollout(&rollout)?;
        Ok(rollout)
    }

    /// Register a workload whose status feeds this rollout's health signal.
    pub async fn track_workload(
        &self,
        rollout_id: RolloutId,
        workload_id: WorkloadId,
    ) -> RolloutResult<()> {
        let rollout = self
            .state
            .get_rollout(&rollout_id)?
            .ok_or(RolloutError::NotFound(rollout_id))?;
        if rollout.is_terminal() {
            return Err(RolloutError::InvalidTransition {
                state: rollout.state,
                reason: "cannot track workloads on a terminal rollout".to_string(),
            });
        }

        let mut tracked = self.tracked.write().await;
        let list = tracked.entry(rollout_id).or_default();
        if !list.contains(&workload_id) {
            debug!(rollout = %rollout_id, workload = %workload_id, "workload tracked");
            list.push(workload_id);
        }
        Ok(())
    }

    /// Workload ids currently tracked for a rollout.
    pub async fn tracked_workloads(&self, rollout_id: RolloutId) -> Vec<WorkloadId> {
        self.tracked
            .read()
            .await
            .get(&rollout_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn pause_rollout(
        &self,
        id: RolloutId,
        reason: Option<String>,
        updated_by: Option<uuid::Uuid>,
    ) -> RolloutResult<ConnectorRollout> {
        self.mutate(id, |ctl, r, now| {
            ctl.pause(r, reason.clone(), updated_by, now).map(|()| None)
        })
        .await
        .map(|e| e.rollout)
    }

    pub async fn resume_rollout(
        &self,
        id: RolloutId,
        updated_by: Option<uuid::Uuid>,
    ) -> RolloutResult<ConnectorRollout> {
        self.mutate(id, |ctl, r, now| {
            ctl.resume(r, updated_by, now).map(|()| None)
        })
        .await
        .map(|e| e.rollout)
    }

    pub async fn cancel_rollout(
        &self,
        id: RolloutId,
        reason: Option<String>,
        updated_by: Option<uuid::Uuid>,
    ) -> RolloutResult<ConnectorRollout> {
        self.mutate(id, |ctl, r, now| {
            ctl.cancel(r, reason.clone(), updated_by, now).map(|()| None)
        })
        .await
        .map(|e| e.rollout)
    }

    /// Operator advance to an explicit target band.
    pub async fn advance_rollout(
        &self,
        id: RolloutId,
        target_pct: u32,
        updated_by: Option<uuid::Uuid>,
    ) -> RolloutResult<Evaluation> {
        self.mutate(id, |ctl, r, now| {
            ctl.advance_to(r, target_pct, updated_by, now).map(Some)
        })
        .await
    }

    /// Record an explicit failure report and enter the rollback path.
    pub async fn fail_rollout(
        &self,
        id: RolloutId,
        reason: String,
        error_msg: Option<String>,
    ) -> RolloutResult<Evaluation> {
        self.mutate(id, |ctl, r, now| {
            ctl.fail(r, reason.clone(), error_msg.clone(), now).map(Some)
        })
        .await
    }

    // ── Evaluation ─────────────────────────────────────────────────

    /// Run one evaluation tick for a rollout.
    pub async fn evaluate(&self, id: RolloutId) -> RolloutResult<Evaluation> {
        let probe = self
            .state
            .get_rollout(&id)?
            .ok_or(RolloutError::NotFound(id))?;

        let lock = self.actor_lock(probe.actor_definition_id).await;
        let _guard = lock.lock().await;

        // Fresh read under the guard so operator mutations (cancel in
        // particular) are observed before any advance decision.
        let mut rollout = self
            .state
            .get_rollout(&id)?
            .ok_or(RolloutError::NotFound(id))?;

        if rollout.is_terminal() {
            return Ok(Evaluation {
                rollout,
                action: None,
            });
        }

        let now = epoch_secs();

        if rollout.state == RolloutState::FailedRollingBack {
            return self.finish_rollback(rollout, now).await;
        }

        let health = match rollout.state {
            RolloutState::InProgress | RolloutState::Finalizing => {
                match self.health_signal(&rollout).await {
                    Ok(h) => h,
                    // A connectivity failure is not escalated: the signal
                    // degrades to Unknown, which holds the step until the
                    // next tick but still counts toward the step-wait
                    // budget. A sustained outage past the budget fails
                    // the rollout through the controller's timeout path.
                    Err(e) => {
                        warn!(rollout = %id, error = %e, "health signal unavailable");
                        HealthSignal::Unknown
                    }
                }
            }
            _ => HealthSignal::Unknown,
        };

        let before = rollout.clone();
        let action = self.controller.evaluate(&mut rollout, health, now)?;
        if rollout != before {
            self.state.put_rollout(&rollout)?;
        }

        if let Some(action) = &action {
            info!(rollout = %id, ?action, state = ?rollout.state, "evaluation produced action");
        }
        Ok(Evaluation { rollout, action })
    }

    /// Evaluate every active rollout once. Errors are logged, not
    /// escalated; a failed tick is retried on the next invocation.
    pub async fn evaluate_all(&self) -> usize {
        let active = match self.state.list_active_rollouts() {
            Ok(list) => list,
            Err(e) => {
                error!(error = %e, "failed to list active rollouts");
                return 0;
            }
        };

        let mut evaluated = 0;
        for rollout in active {
            match self.evaluate(rollout.id).await {
                Ok(_) => evaluated += 1,
                Err(e) => error!(rollout = %rollout.id, error = %e, "evaluation tick failed"),
            }
        }
        evaluated
    }

    /// Recurring evaluation loop; exits on the shutdown signal.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "rollout engine started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let n = self.evaluate_all().await;
                    debug!(evaluated = n, "evaluation tick complete");
                }
                _ = shutdown.changed() => {
                    info!("rollout engine shutting down");
                    break;
                }
            }
        }
    }

    // ── Internals ──────────────────────────────────────────────────

    /// Apply an operator mutation under the actor guard and persist.
    async fn mutate<F>(&self, id: RolloutId, f: F) -> RolloutResult<Evaluation>
    where
        F: FnOnce(
            &RolloutController,
            &mut ConnectorRollout,
            u64,
        ) -> RolloutResult<Option<RolloutAction>>,
    {
        let probe = self
            .state
            .get_rollout(&id)?
            .ok_or(RolloutError::NotFound(id))?;
        let lock = self.actor_lock(probe.actor_definition_id).await;
        let _guard = lock.lock().await;

        let mut rollout = self
            .state
            .get_rollout(&id)?
            .ok_or(RolloutError::NotFound(id))?;
        let action = f(&self.controller, &mut rollout, epoch_secs())?;
        self.state.put_rollout(&rollout)?;
        Ok(Evaluation { rollout, action })
    }

    /// Perform rollback side effects, then complete the transition to
    /// `Failed`. Failure reports are sent once per workload; a report
    /// that cannot be delivered leaves the rollout in
    /// `FailedRollingBack` for the next tick.
    async fn finish_rollback(
        &self,
        mut rollout: ConnectorRollout,
        now: u64,
    ) -> RolloutResult<Evaluation> {
        let tracked = self.tracked_workloads(rollout.id).await;

        for workload_id in tracked {
            if self.reported.read().await.contains(&workload_id) {
                continue;
            }

            let outcome = self.report_workload_failure(&rollout, &workload_id).await;
            match outcome {
                Ok(()) => {
                    self.reported.write().await.insert(workload_id);
                }
                Err(e) => {
                    warn!(
                        rollout = %rollout.id,
                        workload = %workload_id,
                        error = %e,
                        "failure report not delivered, retrying next tick"
                    );
                    return Ok(Evaluation {
                        rollout,
                        action: None,
                    });
                }
            }
        }

        self.controller.complete_rollback(&mut rollout, now)?;
        self.state.put_rollout(&rollout)?;
        Ok(Evaluation {
            rollout,
            action: None,
        })
    }

    /// Report one workload failed, unless it already reached a terminal
    /// state on its own.
    async fn report_workload_failure(
        &self,
        rollout: &ConnectorRollout,
        workload_id: &str,
    ) -> RolloutResult<()> {
        if self.oracle.is_terminal(workload_id).await? {
            return Ok(());
        }
        self.client
            .report_failure(
                workload_id,
                Some(&self.config.failure_report_source),
                rollout.failed_reason.as_deref(),
            )
            .await?;
        Ok(())
    }

    /// Derive the health signal for a rollout.
    async fn health_signal(
        &self,
        rollout: &ConnectorRollout,
    ) -> Result<HealthSignal, syncgrid_workload::WorkloadClientError> {
        if let Some(f) = &self.health_fn {
            return Ok(f(rollout.actor_definition_id).await);
        }

        let tracked = self.tracked_workloads(rollout.id).await;
        if tracked.is_empty() {
            return Ok(HealthSignal::Unknown);
        }

        let mut all_success = true;
        for workload_id in &tracked {
            match self.oracle.status(workload_id).await? {
                WorkloadStatus::Failure | WorkloadStatus::Cancelled => {
                    return Ok(HealthSignal::Unhealthy);
                }
                WorkloadStatus::Success => {}
                _ => all_success = false,
            }
        }

        Ok(if all_success {
            HealthSignal::Healthy
        } else {
            HealthSignal::Unknown
        })
    }

    async fn actor_lock(&self, actor: ActorDefinitionId) -> Arc<Mutex<()>> {
        {
            let locks = self.actor_locks.read().await;
            if let Some(lock) = locks.get(&actor) {
                return lock.clone();
            }
        }
        let mut locks = self.actor_locks.write().await;
        locks.entry(actor).or_default().clone()
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
