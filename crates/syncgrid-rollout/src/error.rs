//! Rollout error types.

use thiserror::Error;
use uuid::Uuid;

use syncgrid_state::RolloutState;

/// Errors that can occur during rollout operations.
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("rollout not found: {0}")]
    NotFound(Uuid),

    #[error("invalid transition from {state:?}: {reason}")]
    InvalidTransition {
        state: RolloutState,
        reason: String,
    },

    #[error("advance past final target: requested {requested}%, final is {final_pct}%")]
    AdvancePastFinal { requested: u32, final_pct: u32 },

    #[error("non-monotonic advance: requested {requested}%, already at {current}%")]
    NonMonotonicAdvance { requested: u32, current: u32 },

    #[error("invalid rollout parameters: {0}")]
    InvalidParams(String),

    #[error("an active rollout already exists for actor definition {0}")]
    ActiveRolloutExists(Uuid),

    #[error("state store error: {0}")]
    State(#[from] syncgrid_state::StateError),

    #[error("workload service error: {0}")]
    Workload(#[from] syncgrid_workload::WorkloadClientError),
}

pub type RolloutResult<T> = Result<T, RolloutError>;
