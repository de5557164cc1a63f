//! Job dispatch for image-generation workers.
//!
//! Requests enter through [`DispatchService::submit`], wait in a [`RequestQueue`],
//! and are handed out by [`DispatchService::pop`] to the first polling worker
//! whose declared capabilities pass the [`EligibilityFilter`]. Every request a
//! worker could not take is tallied in [`SkipCounters`] and returned with the
//! poll response. The claimant reports the finished job through
//! [`DispatchService::complete`], after which the request is never offered again.

pub mod domain;
pub mod eligibility;
pub mod matching;
pub mod models;
pub mod payload;
pub mod queue;
pub mod risk;
pub mod router;
pub mod service;
pub mod skipped;

#[cfg(test)]
mod tests;

pub use domain::{
    ClaimState, ControlType, JobResult, LoraRequest, RequestId, RequestRequirements,
    SourceProcessing, ValidatedGeneration, WaitingRequest, WorkerCapabilities, WorkerIdentity,
    WorkerPoll,
};
pub use eligibility::{is_eligible, EligibilityFilter, RejectReason, Verdict};
pub use matching::{screen, Screening};
pub use models::{Baseline, ModelCatalog, ModelRecord, ModelReference, ModelReferenceError};
pub use payload::{
    GenerationInput, GenerationParams, GenerationPayload, JobCompletion, JobSubmitInput, LoraInput,
    PopInput, PopResponse, RequestStatus, SubmitResponse, ValidationErrors,
};
pub use queue::{QueueError, RequestQueue};
pub use risk::{IpRiskClassifier, StaticIpRisk};
pub use router::dispatch_router;
pub use service::{DispatchError, DispatchService, DispatchSettings, DEFAULT_JOB_TTL_SECS};
pub use skipped::{SkipCounters, SkipTag};
