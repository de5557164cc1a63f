use chrono::{DateTime, Utc};

use super::domain::{JobResult, RequestId, WaitingRequest};

/// Storage abstraction for waiting requests.
///
/// `claim` is the single point of mutual exclusion: only one caller may move a
/// request from pending to claimed. `complete` only succeeds for the worker
/// holding the claim, and a completed request is never pending again.
pub trait RequestQueue: Send + Sync {
    fn enqueue(&self, request: WaitingRequest) -> Result<WaitingRequest, QueueError>;
    /// Pending requests, oldest first.
    fn pending(&self) -> Result<Vec<WaitingRequest>, QueueError>;
    fn claim(
        &self,
        id: &RequestId,
        worker: &str,
        at: DateTime<Utc>,
    ) -> Result<WaitingRequest, QueueError>;
    fn complete(
        &self,
        id: &RequestId,
        worker: &str,
        result: JobResult,
        at: DateTime<Utc>,
    ) -> Result<WaitingRequest, QueueError>;
    fn get(&self, id: &RequestId) -> Result<Option<WaitingRequest>, QueueError>;
    /// Returns claims made before `cutoff` to pending; yields how many moved.
    fn release_stale(&self, cutoff: DateTime<Utc>) -> Result<usize, QueueError>;
}

/// Error enumeration for queue failures.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("request already queued")]
    Conflict,
    #[error("request not found")]
    NotFound,
    #[error("request already claimed by another worker")]
    AlreadyClaimed,
    #[error("request is not claimed by this worker")]
    NotClaimant,
    #[error("request already completed")]
    AlreadyCompleted,
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}
