use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::domain::{RequestId, WaitingRequest, WorkerIdentity};
use super::eligibility::{EligibilityFilter, Verdict};
use super::matching::{screen, Screening};
use super::models::ModelReference;
use super::payload::{
    GenerationInput, JobSubmitInput, PopInput, PopResponse, RequestStatus, SubmitResponse,
    ValidationErrors,
};
use super::queue::{QueueError, RequestQueue};
use super::risk::IpRiskClassifier;
use super::skipped::SkipCounters;

pub const DEFAULT_JOB_TTL_SECS: u32 = 150;

/// Knobs for the dispatch service that do not come from the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    pub trusted_workers: BTreeSet<String>,
    pub job_ttl_secs: u32,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            trusted_workers: BTreeSet::new(),
            job_ttl_secs: DEFAULT_JOB_TTL_SECS,
        }
    }
}

/// Service composing the request queue, model reference and eligibility filter.
pub struct DispatchService<Q> {
    queue: Arc<Q>,
    models: Arc<dyn ModelReference>,
    risk: Arc<dyn IpRiskClassifier>,
    filter: EligibilityFilter,
    settings: DispatchSettings,
}

impl<Q> DispatchService<Q>
where
    Q: RequestQueue + 'static,
{
    pub fn new(
        queue: Arc<Q>,
        models: Arc<dyn ModelReference>,
        risk: Arc<dyn IpRiskClassifier>,
        settings: DispatchSettings,
    ) -> Self {
        let filter = EligibilityFilter::new(models.clone());
        Self {
            queue,
            models,
            risk,
            filter,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Validate and queue a generation request.
    pub fn submit(
        &self,
        input: GenerationInput,
        client_addr: Option<IpAddr>,
    ) -> Result<SubmitResponse, DispatchError> {
        self.submit_at(input, client_addr, Utc::now())
    }

    pub fn submit_at(
        &self,
        input: GenerationInput,
        client_addr: Option<IpAddr>,
        now: DateTime<Utc>,
    ) -> Result<SubmitResponse, DispatchError> {
        let generation = input.validate()?;
        let source_ip_is_unsafe = self.risk.is_unsafe(client_addr);
        if source_ip_is_unsafe {
            warn!(?client_addr, "generation request from unsafe address");
        }

        let request = WaitingRequest::new(generation, source_ip_is_unsafe, now);
        let stored = self.queue.enqueue(request)?;
        info!(
            request = %stored.id,
            pixels = stored.generation.pixel_count(),
            steps = stored.generation.steps,
            "generation request queued"
        );

        Ok(SubmitResponse {
            id: stored.id,
            message: None,
        })
    }

    /// Offer the polling worker the oldest request it is eligible for.
    pub fn pop(&self, input: PopInput) -> Result<PopResponse, DispatchError> {
        self.pop_at(input, Utc::now())
    }

    pub fn pop_at(&self, input: PopInput, now: DateTime<Utc>) -> Result<PopResponse, DispatchError> {
        let poll = input.validate()?;
        let worker = WorkerIdentity {
            trusted: self.settings.trusted_workers.contains(&poll.name),
            name: poll.name,
        };

        let cutoff = now - Duration::seconds(i64::from(self.settings.job_ttl_secs));
        let released = self.queue.release_stale(cutoff)?;
        if released > 0 {
            info!(released, "stale claims returned to the queue");
        }

        let mut skipped = SkipCounters::default();
        for request in self.queue.pending()? {
            let model = match screen(&worker, &poll.models, &request.generation) {
                Screening::Matched { model } => model,
                Screening::Skipped(reason) => {
                    skipped.record(reason);
                    continue;
                }
                Screening::NoCommonModel => continue,
            };

            let requirements = request.requirements_for(&model, self.models.as_ref());
            if let Verdict::Rejected(reason) = self.filter.check(&poll.capabilities, &requirements)
            {
                debug!(
                    worker = %worker.name,
                    request = %request.id,
                    reason = reason.tag(),
                    "request skipped"
                );
                skipped.record(reason);
                continue;
            }

            match self.queue.claim(&request.id, &worker.name, now) {
                Ok(claimed) => {
                    info!(
                        worker = %worker.name,
                        request = %claimed.id,
                        %model,
                        "request claimed"
                    );
                    return Ok(PopResponse::job(
                        claimed,
                        model,
                        self.settings.job_ttl_secs,
                        skipped,
                    ));
                }
                Err(QueueError::AlreadyClaimed | QueueError::NotFound) => {
                    debug!(request = %request.id, "request taken before claim");
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }

        info!(
            worker = %worker.name,
            %skipped,
            "no eligible request for worker"
        );
        Ok(PopResponse::empty(skipped))
    }

    /// Record a finished job for the worker holding its claim.
    pub fn complete(&self, input: JobSubmitInput) -> Result<RequestStatus, DispatchError> {
        self.complete_at(input, Utc::now())
    }

    pub fn complete_at(
        &self,
        input: JobSubmitInput,
        now: DateTime<Utc>,
    ) -> Result<RequestStatus, DispatchError> {
        let completion = input.validate()?;
        let done = self
            .queue
            .complete(&completion.id, &completion.worker, completion.result, now)
            .map_err(|err| {
                warn!(
                    worker = %completion.worker,
                    request = %completion.id,
                    error = %err,
                    "job hand-back refused"
                );
                err
            })?;

        info!(
            worker = %completion.worker,
            request = %done.id,
            seed = completion.result.seed,
            censored = completion.result.censored,
            "job completed"
        );
        Ok(RequestStatus::from(&done))
    }

    pub fn get(&self, id: &RequestId) -> Result<WaitingRequest, DispatchError> {
        let request = self.queue.get(id)?.ok_or(QueueError::NotFound)?;
        Ok(request)
    }

    pub fn status(&self, id: &RequestId) -> Result<RequestStatus, DispatchError> {
        self.get(id).map(|request| RequestStatus::from(&request))
    }
}

/// Error raised by the dispatch service.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Queue(#[from] QueueError),
}
