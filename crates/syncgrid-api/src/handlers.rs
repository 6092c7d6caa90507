//! REST API handlers for rollout management.
//!
//! Mutations go through the `RolloutEngine` so they pick up the same
//! per-actor serialization as the evaluation loop; reads go straight to
//! the state store.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use syncgrid_rollout::{NewRolloutParams, RolloutError};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse + use<> {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// Map rollout errors onto HTTP statuses.
fn rollout_error(err: &RolloutError) -> impl IntoResponse {
    let status = match err {
        RolloutError::NotFound(_) => StatusCode::NOT_FOUND,
        RolloutError::ActiveRolloutExists(_) => StatusCode::CONFLICT,
        RolloutError::State(syncgrid_state::StateError::Conflict(_)) => StatusCode::CONFLICT,
        RolloutError::InvalidParams(_)
        | RolloutError::InvalidTransition { .. }
        | RolloutError::AdvancePastFinal { .. }
        | RolloutError::NonMonotonicAdvance { .. } => StatusCode::BAD_REQUEST,
        RolloutError::Workload(_) => StatusCode::BAD_GATEWAY,
        RolloutError::State(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&err.to_string(), status)
}

// ── Rollouts ───────────────────────────────────────────────────

/// GET /api/v1/rollouts
pub async fn list_rollouts(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_rollouts() {
        Ok(rollouts) => ApiResponse::ok(rollouts).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/rollouts/{id}
pub async fn get_rollout(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.store.get_rollout(&id) {
        Ok(Some(rollout)) => ApiResponse::ok(rollout).into_response(),
        Ok(None) => error_response("rollout not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// POST /api/v1/rollouts
pub async fn create_rollout(
    State(state): State<ApiState>,
    Json(params): Json<NewRolloutParams>,
) -> impl IntoResponse {
    match state.engine.create_rollout(params).await {
        Ok(rollout) => (StatusCode::CREATED, ApiResponse::ok(rollout)).into_response(),
        Err(e) => rollout_error(&e).into_response(),
    }
}

/// Request body for operator advance.
#[derive(serde::Deserialize)]
pub struct AdvanceRequest {
    pub target_pct: u32,
    pub updated_by: Option<Uuid>,
}

/// POST /api/v1/rollouts/{id}/advance
pub async fn advance_rollout(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AdvanceRequest>,
) -> impl IntoResponse {
    match state
        .engine
        .advance_rollout(id, req.target_pct, req.updated_by)
        .await
    {
        Ok(eval) => ApiResponse::ok(eval.rollout).into_response(),
        Err(e) => rollout_error(&e).into_response(),
    }
}

/// Request body for pause and cancel.
#[derive(serde::Deserialize, Default)]
pub struct ReasonRequest {
    pub reason: Option<String>,
    pub updated_by: Option<Uuid>,
}

/// POST /api/v1/rollouts/{id}/pause
pub async fn pause_rollout(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReasonRequest>,
) -> impl IntoResponse {
    match state.engine.pause_rollout(id, req.reason, req.updated_by).await {
        Ok(rollout) => ApiResponse::ok(rollout).into_response(),
        Err(e) => rollout_error(&e).into_response(),
    }
}

/// POST /api/v1/rollouts/{id}/resume
pub async fn resume_rollout(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.engine.resume_rollout(id, None).await {
        Ok(rollout) => ApiResponse::ok(rollout).into_response(),
        Err(e) => rollout_error(&e).into_response(),
    }
}

/// POST /api/v1/rollouts/{id}/cancel
pub async fn cancel_rollout(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReasonRequest>,
) -> impl IntoResponse {
    match state
        .engine
        .cancel_rollout(id, req.reason, req.updated_by)
        .await
    {
        Ok(rollout) => ApiResponse::ok(rollout).into_response(),
        Err(e) => rollout_error(&e).into_response(),
    }
}

/// Request body for explicit failure reports.
#[derive(serde::Deserialize)]
pub struct FailRequest {
    pub reason: String,
    pub error_msg: Option<String>,
}

/// POST /api/v1/rollouts/{id}/fail
pub async fn fail_rollout(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(req): Json<FailRequest>,
) -> impl IntoResponse {
    match state.engine.fail_rollout(id, req.reason, req.error_msg).await {
        Ok(eval) => ApiResponse::ok(eval.rollout).into_response(),
        Err(e) => rollout_error(&e).into_response(),
    }
}

// ── Workload tracking ──────────────────────────────────────────

/// Request body to track a workload.
#[derive(serde::Deserialize)]
pub struct TrackWorkloadRequest {
    pub workload_id: String,
}

/// POST /api/v1/rollouts/{id}/workloads
pub async fn track_workload(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TrackWorkloadRequest>,
) -> impl IntoResponse {
    match state.engine.track_workload(id, req.workload_id).await {
        Ok(()) => (StatusCode::CREATED, ApiResponse::ok("tracked")).into_response(),
        Err(e) => rollout_error(&e).into_response(),
    }
}

/// GET /api/v1/rollouts/{id}/workloads
pub async fn list_workloads(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    ApiResponse::ok(state.engine.tracked_workloads(id).await).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use syncgrid_rollout::{EngineConfig, HealthSignal, RolloutEngine, health_signal_fn};
    use syncgrid_state::{RolloutState, RolloutStrategy, StateStore};
    use syncgrid_workload::{RetryPolicy, WorkloadApiClient, WorkloadClientConfig};

    fn test_state() -> ApiState {
        let store = StateStore::open_in_memory().unwrap();
        let client = Arc::new(WorkloadApiClient::new(
            WorkloadClientConfig {
                base_url: "http://127.0.0.1:1/api/v1/workload".to_string(),
                request_timeout: Duration::from_millis(100),
            },
            RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                jitter: 0.0,
            },
        ));
        let engine = Arc::new(
            RolloutEngine::new(
                store.clone(),
                client,
                EngineConfig {
                    health_confirmation_mins: 0,
                    failure_report_source: "rollout-engine".to_string(),
                },
            )
            .with_health_fn(health_signal_fn(|_| async { HealthSignal::Healthy })),
        );
        ApiState { store, engine }
    }

    fn test_params() -> NewRolloutParams {
        NewRolloutParams {
            actor_definition_id: Uuid::new_v4(),
            release_candidate_version_id: Uuid::new_v4(),
            initial_version_id: None,
            initial_rollout_pct: 10,
            final_target_rollout_pct: 100,
            has_breaking_changes: false,
            rollout_strategy: Some(RolloutStrategy::Manual),
            max_step_wait_time_mins: 60,
            expires_at: None,
            updated_by: None,
        }
    }

    #[tokio::test]
    async fn create_and_get_rollout() {
        let state = test_state();

        let resp = create_rollout(State(state.clone()), Json(test_params())).await;
        let resp = resp.into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let rollouts = state.store.list_rollouts().unwrap();
        assert_eq!(rollouts.len(), 1);

        let resp = get_rollout(State(state), Path(rollouts[0].id)).await;
        assert_eq!(resp.into_response().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_duplicate_active_rollout_conflicts() {
        let state = test_state();
        let params = test_params();

        let resp = create_rollout(State(state.clone()), Json(params.clone())).await;
        assert_eq!(resp.into_response().status(), StatusCode::CREATED);

        let resp = create_rollout(State(state), Json(params)).await;
        assert_eq!(resp.into_response().status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn create_invalid_percentages_rejected() {
        let state = test_state();
        let params = NewRolloutParams {
            initial_rollout_pct: 0,
            ..test_params()
        };

        let resp = create_rollout(State(state), Json(params)).await;
        assert_eq!(resp.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_nonexistent_rollout() {
        let state = test_state();
        let resp = get_rollout(State(state), Path(Uuid::new_v4())).await;
        assert_eq!(resp.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn advance_pause_resume_cancel_flow() {
        let state = test_state();
        create_rollout(State(state.clone()), Json(test_params()))
            .await
            .into_response();
        let id = state.store.list_rollouts().unwrap()[0].id;

        // Start via one evaluation tick.
        state.engine.evaluate(id).await.unwrap();

        let resp = advance_rollout(
            State(state.clone()),
            Path(id),
            Json(AdvanceRequest {
                target_pct: 50,
                updated_by: None,
            }),
        )
        .await;
        assert_eq!(resp.into_response().status(), StatusCode::OK);

        let resp = pause_rollout(
            State(state.clone()),
            Path(id),
            Json(ReasonRequest::default()),
        )
        .await;
        assert_eq!(resp.into_response().status(), StatusCode::OK);
        assert_eq!(
            state.store.get_rollout(&id).unwrap().unwrap().state,
            RolloutState::Paused
        );

        let resp = resume_rollout(State(state.clone()), Path(id)).await;
        assert_eq!(resp.into_response().status(), StatusCode::OK);

        let resp = cancel_rollout(
            State(state.clone()),
            Path(id),
            Json(ReasonRequest {
                reason: Some("superseded".to_string()),
                updated_by: None,
            }),
        )
        .await;
        assert_eq!(resp.into_response().status(), StatusCode::OK);

        let stored = state.store.get_rollout(&id).unwrap().unwrap();
        assert_eq!(stored.state, RolloutState::Canceled);
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn advance_past_final_rejected() {
        let state = test_state();
        create_rollout(State(state.clone()), Json(test_params()))
            .await
            .into_response();
        let id = state.store.list_rollouts().unwrap()[0].id;
        state.engine.evaluate(id).await.unwrap();

        let resp = advance_rollout(
            State(state),
            Path(id),
            Json(AdvanceRequest {
                target_pct: 120,
                updated_by: None,
            }),
        )
        .await;
        assert_eq!(resp.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn fail_rollout_enters_rollback() {
        let state = test_state();
        create_rollout(State(state.clone()), Json(test_params()))
            .await
            .into_response();
        let id = state.store.list_rollouts().unwrap()[0].id;
        state.engine.evaluate(id).await.unwrap();

        let resp = fail_rollout(
            State(state.clone()),
            Path(id),
            Json(FailRequest {
                reason: "sync error rate spiked".to_string(),
                error_msg: None,
            }),
        )
        .await;
        assert_eq!(resp.into_response().status(), StatusCode::OK);

        let stored = state.store.get_rollout(&id).unwrap().unwrap();
        assert_eq!(stored.state, RolloutState::FailedRollingBack);
        assert_eq!(
            stored.failed_reason.as_deref(),
            Some("sync error rate spiked")
        );
    }

    #[tokio::test]
    async fn track_and_list_workloads() {
        let state = test_state();
        create_rollout(State(state.clone()), Json(test_params()))
            .await
            .into_response();
        let id = state.store.list_rollouts().unwrap()[0].id;

        let resp = track_workload(
            State(state.clone()),
            Path(id),
            Json(TrackWorkloadRequest {
                workload_id: "wl-1".to_string(),
            }),
        )
        .await;
        assert_eq!(resp.into_response().status(), StatusCode::CREATED);

        let resp = list_workloads(State(state), Path(id)).await;
        assert_eq!(resp.into_response().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn list_rollouts_empty() {
        let state = test_state();
        let resp = list_rollouts(State(state)).await;
        assert_eq!(resp.into_response().status(), StatusCode::OK);
    }
}
