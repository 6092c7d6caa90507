//! syncgrid-api — REST API for SyncGrid.
//!
//! Provides axum route handlers for managing connector rollouts.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/rollouts` | List all rollouts |
//! | POST | `/api/v1/rollouts` | Create a rollout |
//! | GET | `/api/v1/rollouts/{id}` | Get rollout details |
//! | POST | `/api/v1/rollouts/{id}/advance` | Operator advance to a target band |
//! | POST | `/api/v1/rollouts/{id}/pause` | Pause the rollout |
//! | POST | `/api/v1/rollouts/{id}/resume` | Resume a paused rollout |
//! | POST | `/api/v1/rollouts/{id}/cancel` | Cancel the rollout |
//! | POST | `/api/v1/rollouts/{id}/fail` | Report an explicit failure |
//! | GET | `/api/v1/rollouts/{id}/workloads` | List tracked workloads |
//! | POST | `/api/v1/rollouts/{id}/workloads` | Track a workload |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use syncgrid_rollout::RolloutEngine;
use syncgrid_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub engine: Arc<RolloutEngine>,
}

/// Build the complete API router.
pub fn build_router(store: StateStore, engine: Arc<RolloutEngine>) -> Router {
    let api_state = ApiState { store, engine };

    let api_routes = Router::new()
        .route(
            "/rollouts",
            get(handlers::list_rollouts).post(handlers::create_rollout),
        )
        .route("/rollouts/{id}", get(handlers::get_rollout))
        .route("/rollouts/{id}/advance", post(handlers::advance_rollout))
        .route("/rollouts/{id}/pause", post(handlers::pause_rollout))
        .route("/rollouts/{id}/resume", post(handlers::resume_rollout))
        .route("/rollouts/{id}/cancel", post(handlers::cancel_rollout))
        .route("/rollouts/{id}/fail", post(handlers::fail_rollout))
        .route(
            "/rollouts/{id}/workloads",
            get(handlers::list_workloads).post(handlers::track_workload),
        )
        .with_state(api_state);

    Router::new().nest("/api/v1", api_routes)
}
