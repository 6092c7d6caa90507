//! Rollout controller — the connector rollout state machine.
//!
//! Pure transition logic over a `ConnectorRollout` record. The controller
//! takes the current wall-clock time as a parameter; it performs no I/O
//! and holds no state beyond its configuration, so every transition is
//! directly testable.

use tracing::{debug, info, warn};
use uuid::Uuid;

use syncgrid_state::{
    ActorDefinitionId, ConnectorRollout, RolloutState, RolloutStrategy, VersionId,
};

use crate::error::{RolloutError, RolloutResult};

/// External health verdict for the connector's traffic at the current band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthSignal {
    Healthy,
    Unhealthy,
    Unknown,
}

/// Side effect the caller must apply after a transition.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum RolloutAction {
    /// Pin `pct` percent of traffic to the release candidate.
    SetTraffic { pct: u32 },
    /// Promote the release candidate as the default version.
    Promote,
    /// Revert all traffic to the initial version.
    RollBack,
}

/// Parameters for creating a rollout.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NewRolloutParams {
    pub actor_definition_id: ActorDefinitionId,
    pub release_candidate_version_id: VersionId,
    pub initial_version_id: Option<VersionId>,
    /// First percentage band, and the step size for every advance (1–100).
    pub initial_rollout_pct: u32,
    /// Band at which the rollout finalizes (1–100).
    pub final_target_rollout_pct: u32,
    #[serde(default)]
    pub has_breaking_changes: bool,
    pub rollout_strategy: Option<RolloutStrategy>,
    /// Budget for a single step to reach a healthy status, in minutes.
    pub max_step_wait_time_mins: u64,
    /// Wall-clock deadline for the whole rollout.
    pub expires_at: Option<u64>,
    pub updated_by: Option<Uuid>,
}

/// Controller configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Minutes a step must run healthy before it can advance or finalize.
    pub health_confirmation_mins: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            health_confirmation_mins: 10,
        }
    }
}

/// Drives `ConnectorRollout` records through the state machine.
#[derive(Debug, Clone, Default)]
pub struct RolloutController {
    config: ControllerConfig,
}

impl RolloutController {
    pub fn new(config: ControllerConfig) -> Self {
        Self { config }
    }

    /// Validate parameters and build a new rollout in `Initialized` state.
    ///
    /// A release candidate with breaking changes defaults to the manual
    /// strategy unless one was given explicitly.
    pub fn create(&self, params: NewRolloutParams, now: u64) -> RolloutResult<ConnectorRollout> {
        for (name, pct) in [
            ("initial_rollout_pct", params.initial_rollout_pct),
            ("final_target_rollout_pct", params.final_target_rollout_pct),
        ] {
            if !(1..=100).contains(&pct) {
                return Err(RolloutError::InvalidParams(format!(
                    "{name} must be between 1 and 100, got {pct}"
                )));
            }
        }
        if params.initial_rollout_pct > params.final_target_rollout_pct {
            return Err(RolloutError::InvalidParams(format!(
                "initial_rollout_pct {} exceeds final_target_rollout_pct {}",
                params.initial_rollout_pct, params.final_target_rollout_pct
            )));
        }
        if let Some(expires_at) = params.expires_at {
            if expires_at <= now {
                return Err(RolloutError::InvalidParams(format!(
                    "expires_at {expires_at} is not in the future"
                )));
            }
        }

        let strategy = params.rollout_strategy.or(if params.has_breaking_changes {
            Some(RolloutStrategy::Manual)
        } else {
            None
        });

        let rollout = ConnectorRollout {
            id: Uuid::new_v4(),
            actor_definition_id: params.actor_definition_id,
            release_candidate_version_id: params.release_candidate_version_id,
            initial_version_id: params.initial_version_id,
            state: RolloutState::Initialized,
            initial_rollout_pct: params.initial_rollout_pct,
            current_target_rollout_pct: None,
            final_target_rollout_pct: params.final_target_rollout_pct,
            has_breaking_changes: params.has_breaking_changes,
            rollout_strategy: strategy,
            max_step_wait_time_mins: params.max_step_wait_time_mins,
            updated_by: params.updated_by,
            created_at: now,
            updated_at: now,
            completed_at: None,
            expires_at: params.expires_at,
            current_step_started_at: None,
            error_msg: None,
            failed_reason: None,
            paused_reason: None,
        };

        info!(
            rollout = %rollout.id,
            actor = %rollout.actor_definition_id,
            initial_pct = rollout.initial_rollout_pct,
            final_pct = rollout.final_target_rollout_pct,
            strategy = ?rollout.strategy(),
            "rollout created"
        );
        Ok(rollout)
    }

    /// Run one evaluation step against the rollout.
    ///
    /// Returns the side effect the caller must apply, or `None` when the
    /// rollout holds in place. Terminal rollouts and rollouts mid-rollback
    /// are left untouched.
    pub fn evaluate(
        &self,
        rollout: &mut ConnectorRollout,
        health: HealthSignal,
        now: u64,
    ) -> RolloutResult<Option<RolloutAction>> {
        if rollout.is_terminal() {
            return Ok(None);
        }

        // The overall deadline applies in every non-terminal state,
        // paused included.
        if rollout.expires_at.is_some_and(|e| now >= e) {
            let reason = "rollout expired before completing".to_string();
            self.fail_inner(rollout, reason, None, now);
            return Ok(Some(RolloutAction::RollBack));
        }

        match rollout.state {
            RolloutState::Initialized => Ok(Some(self.start(rollout, now))),
            RolloutState::Paused => Ok(None),
            // Rollback side effects are the engine's job; the record stays
            // put until `complete_rollback`.
            RolloutState::FailedRollingBack => Ok(None),
            RolloutState::InProgress => Ok(self.evaluate_in_progress(rollout, health, now)),
            RolloutState::Finalizing => Ok(self.evaluate_finalizing(rollout, health, now)),
            RolloutState::Succeeded | RolloutState::Failed | RolloutState::Canceled => {
                unreachable!("terminal states handled above")
            }
        }
    }

    fn start(&self, rollout: &mut ConnectorRollout, now: u64) -> RolloutAction {
        rollout.state = RolloutState::InProgress;
        rollout.current_target_rollout_pct = Some(rollout.initial_rollout_pct);
        rollout.current_step_started_at = Some(now);
        rollout.updated_at = now;
        info!(
            rollout = %rollout.id,
            pct = rollout.initial_rollout_pct,
            "rollout started"
        );
        RolloutAction::SetTraffic {
            pct: rollout.initial_rollout_pct,
        }
    }

    fn evaluate_in_progress(
        &self,
        rollout: &mut ConnectorRollout,
        health: HealthSignal,
        now: u64,
    ) -> Option<RolloutAction> {
        let current = rollout
            .current_target_rollout_pct
            .unwrap_or(rollout.initial_rollout_pct);

        match health {
            HealthSignal::Unhealthy => {
                let reason = format!("health signal unhealthy at {current}% traffic");
                self.fail_inner(rollout, reason, None, now);
                Some(RolloutAction::RollBack)
            }
            HealthSignal::Unknown => {
                if self.step_timed_out(rollout, now) {
                    let reason = format!(
                        "step at {current}% exceeded max wait of {} mins without a healthy signal",
                        rollout.max_step_wait_time_mins
                    );
                    self.fail_inner(rollout, reason, None, now);
                    Some(RolloutAction::RollBack)
                } else {
                    debug!(rollout = %rollout.id, pct = current, "health unknown, holding");
                    None
                }
            }
            HealthSignal::Healthy => {
                if !self.step_confirmed(rollout, now) {
                    debug!(rollout = %rollout.id, pct = current, "step not yet confirmed");
                    return None;
                }

                if current == rollout.final_target_rollout_pct {
                    rollout.state = RolloutState::Finalizing;
                    rollout.updated_at = now;
                    info!(rollout = %rollout.id, pct = current, "final band confirmed, finalizing");
                    return None;
                }

                if rollout.strategy() == RolloutStrategy::Manual {
                    debug!(rollout = %rollout.id, pct = current, "manual strategy, awaiting operator advance");
                    return None;
                }

                // Fixed step size; the last step truncates to the final
                // target, never overshoots.
                let next =
                    (current + rollout.initial_rollout_pct).min(rollout.final_target_rollout_pct);
                rollout.current_target_rollout_pct = Some(next);
                rollout.current_step_started_at = Some(now);
                rollout.updated_at = now;
                info!(rollout = %rollout.id, from = current, to = next, "advancing traffic band");
                Some(RolloutAction::SetTraffic { pct: next })
            }
        }
    }

    fn evaluate_finalizing(
        &self,
        rollout: &mut ConnectorRollout,
        health: HealthSignal,
        now: u64,
    ) -> Option<RolloutAction> {
        match health {
            HealthSignal::Unhealthy => {
                let reason = "health signal unhealthy while finalizing".to_string();
                self.fail_inner(rollout, reason, None, now);
                Some(RolloutAction::RollBack)
            }
            HealthSignal::Unknown => {
                if self.step_timed_out(rollout, now) {
                    let reason = format!(
                        "finalize exceeded max wait of {} mins without a healthy signal",
                        rollout.max_step_wait_time_mins
                    );
                    self.fail_inner(rollout, reason, None, now);
                    Some(RolloutAction::RollBack)
                } else {
                    None
                }
            }
            HealthSignal::Healthy => {
                rollout.state = RolloutState::Succeeded;
                rollout.completed_at = Some(now);
                rollout.updated_at = now;
                info!(rollout = %rollout.id, "rollout succeeded");
                Some(RolloutAction::Promote)
            }
        }
    }

    /// Operator advance to an explicit target band (manual strategy, but
    /// also valid as an override for automated rollouts).
    pub fn advance_to(
        &self,
        rollout: &mut ConnectorRollout,
        target: u32,
        updated_by: Option<Uuid>,
        now: u64,
    ) -> RolloutResult<RolloutAction> {
        if rollout.state != RolloutState::InProgress {
            return Err(RolloutError::InvalidTransition {
                state: rollout.state,
                reason: "only an in-progress rollout can advance".to_string(),
            });
        }

        let current = rollout
            .current_target_rollout_pct
            .unwrap_or(rollout.initial_rollout_pct);
        if target > rollout.final_target_rollout_pct {
            return Err(RolloutError::AdvancePastFinal {
                requested: target,
                final_pct: rollout.final_target_rollout_pct,
            });
        }
        if target <= current {
            return Err(RolloutError::NonMonotonicAdvance {
                requested: target,
                current,
            });
        }

        rollout.current_target_rollout_pct = Some(target);
        rollout.current_step_started_at = Some(now);
        rollout.updated_by = updated_by.or(rollout.updated_by);
        rollout.updated_at = now;
        info!(rollout = %rollout.id, from = current, to = target, "operator advanced traffic band");
        Ok(RolloutAction::SetTraffic { pct: target })
    }

    /// Pause the rollout. Valid from `InProgress` and `Finalizing`.
    pub fn pause(
        &self,
        rollout: &mut ConnectorRollout,
        reason: Option<String>,
        updated_by: Option<Uuid>,
        now: u64,
    ) -> RolloutResult<()> {
        if !matches!(
            rollout.state,
            RolloutState::InProgress | RolloutState::Finalizing
        ) {
            return Err(RolloutError::InvalidTransition {
                state: rollout.state,
                reason: "only an in-progress rollout can pause".to_string(),
            });
        }
        rollout.state = RolloutState::Paused;
        rollout.paused_reason = reason;
        rollout.updated_by = updated_by.or(rollout.updated_by);
        rollout.updated_at = now;
        info!(rollout = %rollout.id, reason = ?rollout.paused_reason, "rollout paused");
        Ok(())
    }

    /// Resume a paused rollout. The step clock restarts: time accumulated
    /// before the pause does not count toward confirmation.
    pub fn resume(
        &self,
        rollout: &mut ConnectorRollout,
        updated_by: Option<Uuid>,
        now: u64,
    ) -> RolloutResult<()> {
        if rollout.state != RolloutState::Paused {
            return Err(RolloutError::InvalidTransition {
                state: rollout.state,
                reason: "only a paused rollout can resume".to_string(),
            });
        }
        rollout.state = RolloutState::InProgress;
        rollout.paused_reason = None;
        rollout.current_step_started_at = Some(now);
        rollout.updated_by = updated_by.or(rollout.updated_by);
        rollout.updated_at = now;
        info!(rollout = %rollout.id, "rollout resumed");
        Ok(())
    }

    /// Cancel the rollout. Valid from any non-terminal state.
    pub fn cancel(
        &self,
        rollout: &mut ConnectorRollout,
        reason: Option<String>,
        updated_by: Option<Uuid>,
        now: u64,
    ) -> RolloutResult<()> {
        if rollout.is_terminal() {
            return Err(RolloutError::InvalidTransition {
                state: rollout.state,
                reason: "rollout already terminal".to_string(),
            });
        }
        rollout.state = RolloutState::Canceled;
        rollout.paused_reason = reason;
        rollout.completed_at = Some(now);
        rollout.updated_by = updated_by.or(rollout.updated_by);
        rollout.updated_at = now;
        info!(rollout = %rollout.id, "rollout cancelled");
        Ok(())
    }

    /// Record an explicit failure and enter the rollback path.
    ///
    /// Idempotent for a rollout already rolling back.
    pub fn fail(
        &self,
        rollout: &mut ConnectorRollout,
        reason: String,
        error_msg: Option<String>,
        now: u64,
    ) -> RolloutResult<RolloutAction> {
        if rollout.is_terminal() {
            return Err(RolloutError::InvalidTransition {
                state: rollout.state,
                reason: "rollout already terminal".to_string(),
            });
        }
        if rollout.state != RolloutState::FailedRollingBack {
            self.fail_inner(rollout, reason, error_msg, now);
        }
        Ok(RolloutAction::RollBack)
    }

    /// Finish the rollback: `FailedRollingBack` becomes terminal `Failed`.
    pub fn complete_rollback(
        &self,
        rollout: &mut ConnectorRollout,
        now: u64,
    ) -> RolloutResult<()> {
        if rollout.state != RolloutState::FailedRollingBack {
            return Err(RolloutError::InvalidTransition {
                state: rollout.state,
                reason: "rollout is not rolling back".to_string(),
            });
        }
        rollout.state = RolloutState::Failed;
        rollout.completed_at = Some(now);
        rollout.updated_at = now;
        info!(rollout = %rollout.id, reason = ?rollout.failed_reason, "rollback complete, rollout failed");
        Ok(())
    }

    fn fail_inner(
        &self,
        rollout: &mut ConnectorRollout,
        reason: String,
        error_msg: Option<String>,
        now: u64,
    ) {
        warn!(rollout = %rollout.id, %reason, "rollout failing, rolling back");
        rollout.state = RolloutState::FailedRollingBack;
        rollout.failed_reason = Some(reason);
        if error_msg.is_some() {
            rollout.error_msg = error_msg;
        }
        rollout.updated_at = now;
    }

    fn step_confirmed(&self, rollout: &ConnectorRollout, now: u64) -> bool {
        let started = rollout
            .current_step_started_at
            .unwrap_or(rollout.updated_at);
        now.saturating_sub(started) >= self.config.health_confirmation_mins * 60
    }

    fn step_timed_out(&self, rollout: &ConnectorRollout, now: u64) -> bool {
        let started = rollout
            .current_step_started_at
            .unwrap_or(rollout.updated_at);
        now.saturating_sub(started) > rollout.max_step_wait_time_mins * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_000_000;

    fn controller() -> RolloutController {
        // Zero confirmation window so every healthy tick can advance.
        RolloutController::new(ControllerConfig {
            health_confirmation_mins: 0,
        })
    }

    fn params() -> NewRolloutParams {
        NewRolloutParams {
            actor_definition_id: Uuid::new_v4(),
            release_candidate_version_id: Uuid::new_v4(),
            initial_version_id: Some(Uuid::new_v4()),
            initial_rollout_pct: 10,
            final_target_rollout_pct: 100,
            has_breaking_changes: false,
            rollout_strategy: Some(RolloutStrategy::Automated),
            max_step_wait_time_mins: 60,
            expires_at: None,
            updated_by: None,
        }
    }

    fn started(ctl: &RolloutController) -> ConnectorRollout {
        let mut r = ctl.create(params(), T0).unwrap();
        ctl.evaluate(&mut r, HealthSignal::Unknown, T0).unwrap();
        assert_eq!(r.state, RolloutState::InProgress);
        r
    }

    #[test]
    fn create_validates_percentages() {
        let ctl = controller();
        for (initial, fin) in [(0, 100), (101, 100), (10, 0), (10, 101), (50, 40)] {
            let p = NewRolloutParams {
                initial_rollout_pct: initial,
                final_target_rollout_pct: fin,
                ..params()
            };
            assert!(
                matches!(ctl.create(p, T0), Err(RolloutError::InvalidParams(_))),
                "expected rejection for initial={initial} final={fin}"
            );
        }
    }

    #[test]
    fn create_rejects_past_expiry() {
        let ctl = controller();
        let p = NewRolloutParams {
            expires_at: Some(T0),
            ..params()
        };
        assert!(matches!(
            ctl.create(p, T0),
            Err(RolloutError::InvalidParams(_))
        ));
    }

    #[test]
    fn breaking_changes_default_to_manual() {
        let ctl = controller();
        let p = NewRolloutParams {
            has_breaking_changes: true,
            rollout_strategy: None,
            ..params()
        };
        let r = ctl.create(p, T0).unwrap();
        assert_eq!(r.strategy(), RolloutStrategy::Manual);
    }

    #[test]
    fn start_sets_initial_band() {
        let ctl = controller();
        let mut r = ctl.create(params(), T0).unwrap();
        assert_eq!(r.current_target_rollout_pct, None);

        let action = ctl.evaluate(&mut r, HealthSignal::Unknown, T0).unwrap();
        assert_eq!(action, Some(RolloutAction::SetTraffic { pct: 10 }));
        assert_eq!(r.state, RolloutState::InProgress);
        assert_eq!(r.current_target_rollout_pct, Some(10));
        assert_eq!(r.current_step_started_at, Some(T0));
    }

    #[test]
    fn healthy_rollout_walks_exact_band_sequence() {
        let ctl = controller();
        let mut r = ctl.create(params(), T0).unwrap();

        let mut bands = Vec::new();
        let mut now = T0;
        loop {
            now += 60;
            match ctl.evaluate(&mut r, HealthSignal::Healthy, now).unwrap() {
                Some(RolloutAction::SetTraffic { pct }) => bands.push(pct),
                Some(RolloutAction::Promote) => break,
                Some(RolloutAction::RollBack) => panic!("unexpected rollback"),
                None => {}
            }
            assert!(bands.len() <= 20, "rollout did not converge");
        }

        assert_eq!(bands, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
        assert_eq!(r.state, RolloutState::Succeeded);
        assert_eq!(r.completed_at, Some(T0 + 60 * 12));
    }

    #[test]
    fn last_step_truncates_to_final() {
        let ctl = controller();
        let p = NewRolloutParams {
            initial_rollout_pct: 30,
            final_target_rollout_pct: 100,
            ..params()
        };
        let mut r = ctl.create(p, T0).unwrap();

        let mut bands = Vec::new();
        let mut now = T0;
        for _ in 0..10 {
            now += 60;
            if let Some(RolloutAction::SetTraffic { pct }) =
                ctl.evaluate(&mut r, HealthSignal::Healthy, now).unwrap()
            {
                bands.push(pct);
            }
        }
        assert_eq!(bands, vec![30, 60, 90, 100]);
    }

    #[test]
    fn band_is_monotonically_non_decreasing() {
        let ctl = controller();
        let mut r = ctl.create(params(), T0).unwrap();

        let mut last = 0;
        let mut now = T0;
        while !r.is_terminal() {
            now += 60;
            ctl.evaluate(&mut r, HealthSignal::Healthy, now).unwrap();
            let current = r.current_target_rollout_pct.unwrap();
            assert!(current >= last, "band regressed from {last} to {current}");
            last = current;
        }
    }

    #[test]
    fn at_final_band_transitions_toward_succeeded_not_past() {
        let ctl = controller();
        let mut r = started(&ctl);
        r.current_target_rollout_pct = Some(100);

        let action = ctl
            .evaluate(&mut r, HealthSignal::Healthy, T0 + 60)
            .unwrap();
        assert_eq!(action, None);
        assert_eq!(r.state, RolloutState::Finalizing);
        assert_eq!(r.current_target_rollout_pct, Some(100));
    }

    #[test]
    fn completed_at_set_iff_terminal() {
        let ctl = controller();
        let mut r = ctl.create(params(), T0).unwrap();
        assert_eq!(r.completed_at, None);

        ctl.evaluate(&mut r, HealthSignal::Unknown, T0).unwrap();
        assert_eq!(r.completed_at, None);

        ctl.pause(&mut r, None, None, T0 + 10).unwrap();
        assert_eq!(r.completed_at, None);
        ctl.resume(&mut r, None, T0 + 20).unwrap();
        assert_eq!(r.completed_at, None);

        ctl.fail(&mut r, "operator fail".to_string(), None, T0 + 30)
            .unwrap();
        assert_eq!(r.state, RolloutState::FailedRollingBack);
        assert_eq!(r.completed_at, None);

        ctl.complete_rollback(&mut r, T0 + 40).unwrap();
        assert_eq!(r.state, RolloutState::Failed);
        assert_eq!(r.completed_at, Some(T0 + 40));
    }

    #[test]
    fn unhealthy_signal_rolls_back() {
        let ctl = controller();
        let mut r = started(&ctl);

        let action = ctl
            .evaluate(&mut r, HealthSignal::Unhealthy, T0 + 60)
            .unwrap();
        assert_eq!(action, Some(RolloutAction::RollBack));
        assert_eq!(r.state, RolloutState::FailedRollingBack);
        assert!(r.failed_reason.as_ref().unwrap().contains("unhealthy"));
    }

    #[test]
    fn unknown_signal_within_budget_holds() {
        let ctl = controller();
        let mut r = started(&ctl);

        // 59 minutes in, one under the 60-minute budget.
        let action = ctl
            .evaluate(&mut r, HealthSignal::Unknown, T0 + 59 * 60)
            .unwrap();
        assert_eq!(action, None);
        assert_eq!(r.state, RolloutState::InProgress);
    }

    #[test]
    fn sustained_unknown_signal_times_out() {
        let ctl = controller();
        let mut r = started(&ctl);

        let action = ctl
            .evaluate(&mut r, HealthSignal::Unknown, T0 + 61 * 60)
            .unwrap();
        assert_eq!(action, Some(RolloutAction::RollBack));
        assert_eq!(r.state, RolloutState::FailedRollingBack);
        assert!(r.failed_reason.as_ref().unwrap().contains("exceeded"));
    }

    #[test]
    fn confirmation_window_holds_healthy_step() {
        let ctl = RolloutController::new(ControllerConfig {
            health_confirmation_mins: 10,
        });
        let mut r = ctl.create(params(), T0).unwrap();
        ctl.evaluate(&mut r, HealthSignal::Unknown, T0).unwrap();

        // Healthy, but only 5 minutes into the 10-minute window.
        let action = ctl
            .evaluate(&mut r, HealthSignal::Healthy, T0 + 5 * 60)
            .unwrap();
        assert_eq!(action, None);
        assert_eq!(r.current_target_rollout_pct, Some(10));

        // Window elapsed: the advance lands.
        let action = ctl
            .evaluate(&mut r, HealthSignal::Healthy, T0 + 10 * 60)
            .unwrap();
        assert_eq!(action, Some(RolloutAction::SetTraffic { pct: 20 }));
    }

    #[test]
    fn manual_strategy_holds_until_operator_advances() {
        let ctl = controller();
        let p = NewRolloutParams {
            rollout_strategy: Some(RolloutStrategy::Manual),
            ..params()
        };
        let mut r = ctl.create(p, T0).unwrap();
        ctl.evaluate(&mut r, HealthSignal::Unknown, T0).unwrap();

        // Healthy and confirmed, but manual: no automatic advance.
        let action = ctl
            .evaluate(&mut r, HealthSignal::Healthy, T0 + 3600)
            .unwrap();
        assert_eq!(action, None);
        assert_eq!(r.current_target_rollout_pct, Some(10));

        let operator = Uuid::new_v4();
        let action = ctl
            .advance_to(&mut r, 40, Some(operator), T0 + 3700)
            .unwrap();
        assert_eq!(action, RolloutAction::SetTraffic { pct: 40 });
        assert_eq!(r.updated_by, Some(operator));
    }

    #[test]
    fn manual_healthy_step_does_not_time_out() {
        let ctl = controller();
        let p = NewRolloutParams {
            rollout_strategy: Some(RolloutStrategy::Manual),
            ..params()
        };
        let mut r = ctl.create(p, T0).unwrap();
        ctl.evaluate(&mut r, HealthSignal::Unknown, T0).unwrap();

        // Far past the step budget, but healthy: manual rollouts wait.
        let action = ctl
            .evaluate(&mut r, HealthSignal::Healthy, T0 + 1000 * 60)
            .unwrap();
        assert_eq!(action, None);
        assert_eq!(r.state, RolloutState::InProgress);
    }

    #[test]
    fn advance_past_final_is_rejected_not_clamped() {
        let ctl = controller();
        let mut r = started(&ctl);

        let err = ctl.advance_to(&mut r, 110, None, T0 + 60).unwrap_err();
        assert!(matches!(
            err,
            RolloutError::AdvancePastFinal {
                requested: 110,
                final_pct: 100
            }
        ));
        // The record is untouched.
        assert_eq!(r.current_target_rollout_pct, Some(10));
    }

    #[test]
    fn backwards_advance_is_rejected() {
        let ctl = controller();
        let mut r = started(&ctl);
        ctl.advance_to(&mut r, 50, None, T0 + 60).unwrap();

        let err = ctl.advance_to(&mut r, 30, None, T0 + 120).unwrap_err();
        assert!(matches!(err, RolloutError::NonMonotonicAdvance { .. }));
        let err = ctl.advance_to(&mut r, 50, None, T0 + 120).unwrap_err();
        assert!(matches!(err, RolloutError::NonMonotonicAdvance { .. }));
    }

    #[test]
    fn paused_rollout_holds_and_resumes() {
        let ctl = controller();
        let mut r = started(&ctl);

        ctl.pause(&mut r, Some("investigating sync errors".to_string()), None, T0 + 60)
            .unwrap();
        assert_eq!(r.state, RolloutState::Paused);
        assert_eq!(
            r.paused_reason.as_deref(),
            Some("investigating sync errors")
        );

        // Evaluation holds while paused, even with a healthy signal.
        let action = ctl
            .evaluate(&mut r, HealthSignal::Healthy, T0 + 120)
            .unwrap();
        assert_eq!(action, None);
        assert_eq!(r.state, RolloutState::Paused);

        ctl.resume(&mut r, None, T0 + 180).unwrap();
        assert_eq!(r.state, RolloutState::InProgress);
        assert_eq!(r.paused_reason, None);
        // Step clock restarted on resume.
        assert_eq!(r.current_step_started_at, Some(T0 + 180));
    }

    #[test]
    fn pause_requires_in_progress() {
        let ctl = controller();
        let mut r = ctl.create(params(), T0).unwrap();
        assert!(ctl.pause(&mut r, None, None, T0).is_err());
    }

    #[test]
    fn cancel_from_any_non_terminal_state() {
        let ctl = controller();

        let setups: [fn(&RolloutController, &mut ConnectorRollout); 4] = [
            |_, r| assert_eq!(r.state, RolloutState::Initialized),
            |ctl, r| {
                ctl.evaluate(r, HealthSignal::Unknown, T0).unwrap();
            },
            |ctl, r| {
                ctl.evaluate(r, HealthSignal::Unknown, T0).unwrap();
                ctl.pause(r, None, None, T0 + 1).unwrap();
            },
            |ctl, r| {
                ctl.evaluate(r, HealthSignal::Unknown, T0).unwrap();
                ctl.fail(r, "boom".to_string(), None, T0 + 1).unwrap();
            },
        ];
        for setup in setups {
            let mut r = ctl.create(params(), T0).unwrap();
            setup(&ctl, &mut r);
            ctl.cancel(&mut r, Some("superseded".to_string()), None, T0 + 100)
                .unwrap();
            assert_eq!(r.state, RolloutState::Canceled);
            assert_eq!(r.completed_at, Some(T0 + 100));
        }
    }

    #[test]
    fn cancel_terminal_rollout_is_rejected() {
        let ctl = controller();
        let mut r = started(&ctl);
        ctl.cancel(&mut r, None, None, T0 + 60).unwrap();

        let err = ctl.cancel(&mut r, None, None, T0 + 120).unwrap_err();
        assert!(matches!(err, RolloutError::InvalidTransition { .. }));
    }

    #[test]
    fn fail_is_idempotent_while_rolling_back() {
        let ctl = controller();
        let mut r = started(&ctl);

        ctl.fail(&mut r, "first".to_string(), None, T0 + 60).unwrap();
        let action = ctl
            .fail(&mut r, "second".to_string(), None, T0 + 120)
            .unwrap();
        assert_eq!(action, RolloutAction::RollBack);
        // The original reason is preserved.
        assert_eq!(r.failed_reason.as_deref(), Some("first"));
    }

    #[test]
    fn expired_rollout_fails_even_while_paused() {
        let ctl = controller();
        let p = NewRolloutParams {
            expires_at: Some(T0 + 3600),
            ..params()
        };
        let mut r = ctl.create(p, T0).unwrap();
        ctl.evaluate(&mut r, HealthSignal::Unknown, T0).unwrap();
        ctl.pause(&mut r, None, None, T0 + 60).unwrap();

        let action = ctl
            .evaluate(&mut r, HealthSignal::Unknown, T0 + 3600)
            .unwrap();
        assert_eq!(action, Some(RolloutAction::RollBack));
        assert_eq!(r.state, RolloutState::FailedRollingBack);
        assert!(r.failed_reason.as_ref().unwrap().contains("expired"));
    }

    #[test]
    fn terminal_rollout_is_inert() {
        let ctl = controller();
        let mut r = started(&ctl);
        ctl.cancel(&mut r, None, None, T0 + 60).unwrap();

        let before = r.clone();
        let action = ctl
            .evaluate(&mut r, HealthSignal::Healthy, T0 + 10_000)
            .unwrap();
        assert_eq!(action, None);
        assert_eq!(r, before);
    }
}
