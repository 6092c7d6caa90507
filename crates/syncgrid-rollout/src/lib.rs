//! syncgrid-rollout — the staged canary rollout engine for connector versions.
//!
//! A rollout moves a connector release candidate through percentage bands
//! (`initial_rollout_pct` steps up to `final_target_rollout_pct`), gated
//! by a pluggable health signal and bounded by a per-step wait budget and
//! an overall expiry deadline.
//!
//! # Components
//!
//! - **`controller`** — the pure state machine over a `ConnectorRollout`
//!   record: start, advance, finalize, fail, cancel, pause, resume
//! - **`engine`** — the tick-driven evaluator: serializes evaluation per
//!   actor definition, derives the health signal from the workload status
//!   oracle, persists transitions, and performs rollback side effects
//!
//! # States
//!
//! ```text
//! INITIALIZED ──► IN_PROGRESS ──► FINALIZING ──► SUCCEEDED
//!                   │  ▲  │
//!                   │  └── PAUSED (transient)
//!                   ▼
//!        FAILED_ROLLING_BACK ──► FAILED        CANCELED (from any
//!                                              non-terminal state)
//! ```

pub mod controller;
pub mod engine;
pub mod error;

pub use controller::{
    ControllerConfig, HealthSignal, NewRolloutParams, RolloutAction, RolloutController,
};
pub use engine::{BoxFuture, EngineConfig, Evaluation, HealthSignalFn, RolloutEngine, health_signal_fn};
pub use error::{RolloutError, RolloutResult};
