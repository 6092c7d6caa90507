//! syncgrid-workload — workload service client for SyncGrid.
//!
//! Consolidates all calls to the external workload service behind one
//! HTTP client with an explicit retry policy and a shared connection
//! pool. The rollout engine never talks to the workload service
//! directly; it goes through `WorkloadApiClient` or the thin
//! `WorkloadStatusOracle` on top of it.
//!
//! # Components
//!
//! - **`retry`** — `RetryPolicy`: max attempts, exponential backoff, jitter
//! - **`client`** — `WorkloadApiClient`: status fetch and failure reporting
//! - **`oracle`** — `WorkloadStatusOracle`: terminal-state queries
//!
//! # Failure semantics
//!
//! Transport errors and 5xx responses are retried per policy up to the
//! bounded attempt count, then surfaced as `Connectivity`. Malformed
//! response bodies and 4xx responses are fatal and never retried.

pub mod client;
pub mod oracle;
pub mod retry;

pub use client::{WorkloadApiClient, WorkloadClientConfig, WorkloadStatus};
pub use client::{WorkloadClientError, WorkloadResult};
pub use oracle::WorkloadStatusOracle;
pub use retry::RetryPolicy;
