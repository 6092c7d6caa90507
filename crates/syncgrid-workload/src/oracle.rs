//! Workload status oracle.
//!
//! Answers one question: has a workload reached a terminal state. Fails
//! with the client's transient connectivity error if the workload service
//! is unreachable; the caller decides whether to retry. No side effects.

use std::sync::Arc;

use crate::client::{WorkloadApiClient, WorkloadResult, WorkloadStatus};

/// Read-only view over workload terminal status.
#[derive(Clone)]
pub struct WorkloadStatusOracle {
    client: Arc<WorkloadApiClient>,
}

impl WorkloadStatusOracle {
    pub fn new(client: Arc<WorkloadApiClient>) -> Self {
        Self { client }
    }

    /// Whether the workload has finished (succeeded, failed, or cancelled).
    pub async fn is_terminal(&self, workload_id: &str) -> WorkloadResult<bool> {
        Ok(self.client.get_status(workload_id).await?.is_terminal())
    }

    /// Current status of the workload.
    pub async fn status(&self, workload_id: &str) -> WorkloadResult<WorkloadStatus> {
        self.client.get_status(workload_id).await
    }
}
