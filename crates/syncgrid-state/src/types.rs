//! Domain types for the SyncGrid state store.
//!
//! The central entity is `ConnectorRollout`: one in-flight canary
//! deployment of a connector release candidate. Records are serializable
//! to/from JSON for storage in redb tables. Timestamps are unix epoch
//! seconds; percentage fields are whole percent (1–100).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a rollout.
pub type RolloutId = Uuid;

/// Unique identifier for an actor definition (the connector type).
pub type ActorDefinitionId = Uuid;

/// Unique identifier for a connector version.
pub type VersionId = Uuid;

/// Opaque identifier for an external workload (owned by the workload service).
pub type WorkloadId = String;

// ── Rollout ───────────────────────────────────────────────────────

/// Lifecycle state of a connector rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutState {
    /// Created, not yet picked up by the engine.
    Initialized,
    /// Actively shifting traffic through percentage bands.
    InProgress,
    /// Held by operator request; returns to `InProgress` on resume.
    Paused,
    /// Final percentage reached, confirming health before promotion.
    Finalizing,
    /// Release candidate fully promoted. Terminal.
    Succeeded,
    /// Failure detected, traffic being reverted to the initial version.
    FailedRollingBack,
    /// Rollback complete. Terminal.
    Failed,
    /// Cancelled by operator. Terminal.
    Canceled,
}

impl RolloutState {
    /// Whether no further automatic transition occurs from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

/// Who drives percentage advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutStrategy {
    /// Operator posts each advance explicitly.
    Manual,
    /// The engine advances on its tick once a step has confirmed healthy.
    Automated,
}

/// One in-flight canary deployment of a connector release candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectorRollout {
    pub id: RolloutId,
    /// The connector type being rolled out.
    pub actor_definition_id: ActorDefinitionId,
    /// The new version under rollout.
    pub release_candidate_version_id: VersionId,
    /// The version traffic reverts to on rollback.
    pub initial_version_id: Option<VersionId>,
    pub state: RolloutState,
    /// First percentage band, and the fixed step size for every advance.
    pub initial_rollout_pct: u32,
    /// Current traffic band. Unset until the rollout starts.
    pub current_target_rollout_pct: Option<u32>,
    /// Percentage at which the rollout finalizes.
    pub final_target_rollout_pct: u32,
    pub has_breaking_changes: bool,
    pub rollout_strategy: Option<RolloutStrategy>,
    /// Budget for a single step to reach a healthy status, in minutes.
    pub max_step_wait_time_mins: u64,
    /// Operator who last mutated this rollout.
    pub updated_by: Option<Uuid>,
    pub created_at: u64,
    pub updated_at: u64,
    /// Set iff `state` is terminal.
    pub completed_at: Option<u64>,
    /// Wall-clock deadline for the whole rollout.
    pub expires_at: Option<u64>,
    /// When the current percentage step began.
    pub current_step_started_at: Option<u64>,
    pub error_msg: Option<String>,
    pub failed_reason: Option<String>,
    pub paused_reason: Option<String>,
}

impl ConnectorRollout {
    /// Build the key for the rollouts table.
    pub fn table_key(&self) -> String {
        self.id.to_string()
    }

    /// Whether this rollout is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Effective strategy; `Automated` when unset.
    pub fn strategy(&self) -> RolloutStrategy {
        self.rollout_strategy.unwrap_or(RolloutStrategy::Automated)
    }
}
