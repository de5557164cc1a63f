use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::dispatch::domain::{
    ClaimState, JobResult, RequestId, RequestRequirements, SourceProcessing, WaitingRequest,
    WorkerCapabilities,
};
use crate::dispatch::models::{Baseline, ModelCatalog, ModelRecord};
use crate::dispatch::payload::{GenerationInput, GenerationParams, JobSubmitInput, PopInput};
use crate::dispatch::queue::{QueueError, RequestQueue};
use crate::dispatch::risk::StaticIpRisk;
use crate::dispatch::service::{DispatchService, DispatchSettings};

pub(super) const UNSAFE_ADDR: &str = "203.0.113.7";

pub(super) fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Worker that accepts everything and has room for 1024x1024.
pub(super) fn permissive_worker() -> WorkerCapabilities {
    WorkerCapabilities {
        max_pixels: 1024 * 1024,
        limit_max_steps: false,
        ..WorkerCapabilities::default()
    }
}

/// A plain 512x512 txt2img request with nothing special.
pub(super) fn plain_request() -> RequestRequirements {
    RequestRequirements {
        model: "stable_diffusion".to_string(),
        pixel_count: 512 * 512,
        step_count: 30,
        prompt_text: "a lighthouse at dusk, oil painting".to_string(),
        is_img2img: false,
        is_painting: false,
        requests_post_processing: false,
        requests_controlnet: false,
        requests_sdxl_controlnet: false,
        requests_lora: false,
        source_ip_is_unsafe: false,
    }
}

pub(super) fn catalog() -> ModelCatalog {
    let mut catalog = ModelCatalog::default();
    catalog.insert(
        "stable_diffusion",
        ModelRecord {
            baseline: Baseline::StableDiffusion1,
            average_steps: Some(60),
        },
    );
    catalog.insert(
        "SDXL 1.0",
        ModelRecord {
            baseline: Baseline::StableDiffusionXl,
            average_steps: Some(40),
        },
    );
    catalog
}

pub(super) fn generation_input(prompt: &str) -> GenerationInput {
    GenerationInput {
        prompt: prompt.to_string(),
        params: GenerationParams::default(),
        nsfw: false,
        trusted_workers: false,
        censor_nsfw: false,
        workers: Vec::new(),
        worker_blacklist: false,
        models: Vec::new(),
        source_image: None,
        source_processing: SourceProcessing::Img2Img.label().to_string(),
        source_mask: None,
    }
}

pub(super) fn pop_input(name: &str) -> PopInput {
    PopInput {
        max_pixels: 1024 * 1024,
        ..PopInput::named(name)
    }
}

pub(super) fn job_submit(id: RequestId, worker: &str, seed: i64) -> JobSubmitInput {
    JobSubmitInput {
        id,
        name: worker.to_string(),
        seed,
        censored: false,
    }
}

pub(super) fn settings() -> DispatchSettings {
    DispatchSettings {
        trusted_workers: BTreeSet::from(["trusty".to_string()]),
        job_ttl_secs: 120,
    }
}

pub(super) fn build_service() -> (Arc<DispatchService<MemoryQueue>>, Arc<MemoryQueue>) {
    let queue = Arc::new(MemoryQueue::default());
    let risk = StaticIpRisk::new([UNSAFE_ADDR.parse().expect("valid ip")]);
    let service = Arc::new(DispatchService::new(
        queue.clone(),
        Arc::new(catalog()),
        Arc::new(risk),
        settings(),
    ));
    (service, queue)
}

#[derive(Default)]
pub(super) struct MemoryQueue {
    requests: Mutex<Vec<WaitingRequest>>,
}

impl MemoryQueue {
    pub(super) fn snapshot(&self) -> Vec<WaitingRequest> {
        self.requests.lock().expect("queue mutex poisoned").clone()
    }
}

impl RequestQueue for MemoryQueue {
    fn enqueue(&self, request: WaitingRequest) -> Result<WaitingRequest, QueueError> {
        let mut guard = self.requests.lock().expect("queue mutex poisoned");
        if guard.iter().any(|existing| existing.id == request.id) {
            return Err(QueueError::Conflict);
        }
        guard.push(request.clone());
        Ok(request)
    }

    fn pending(&self) -> Result<Vec<WaitingRequest>, QueueError> {
        let guard = self.requests.lock().expect("queue mutex poisoned");
        let mut pending: Vec<_> = guard
            .iter()
            .filter(|request| request.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|request| request.created_at);
        Ok(pending)
    }

    fn claim(
        &self,
        id: &RequestId,
        worker: &str,
        at: DateTime<Utc>,
    ) -> Result<WaitingRequest, QueueError> {
        let mut guard = self.requests.lock().expect("queue mutex poisoned");
        let request = guard
            .iter_mut()
            .find(|request| &request.id == id)
            .ok_or(QueueError::NotFound)?;
        if !request.is_pending() {
            return Err(QueueError::AlreadyClaimed);
        }
        request.state = ClaimState::Claimed {
            worker: worker.to_string(),
            claimed_at: at,
        };
        Ok(request.clone())
    }

    fn complete(
        &self,
        id: &RequestId,
        worker: &str,
        result: JobResult,
        at: DateTime<Utc>,
    ) -> Result<WaitingRequest, QueueError> {
        let mut guard = self.requests.lock().expect("queue mutex poisoned");
        let request = guard
            .iter_mut()
            .find(|request| &request.id == id)
            .ok_or(QueueError::NotFound)?;
        request.mark_done(worker, result, at)?;
        Ok(request.clone())
    }

    fn get(&self, id: &RequestId) -> Result<Option<WaitingRequest>, QueueError> {
        let guard = self.requests.lock().expect("queue mutex poisoned");
        Ok(guard.iter().find(|request| &request.id == id).cloned())
    }

    fn release_stale(&self, cutoff: DateTime<Utc>) -> Result<usize, QueueError> {
        let mut guard = self.requests.lock().expect("queue mutex poisoned");
        let mut released = 0;
        for request in guard.iter_mut() {
            if matches!(request.state, ClaimState::Claimed { claimed_at, .. } if claimed_at < cutoff)
            {
                request.state = ClaimState::Pending;
                released += 1;
            }
        }
        Ok(released)
    }
}

/// Queue whose claims always lose the race.
pub(super) struct ContestedQueue {
    pub(super) inner: MemoryQueue,
}

impl RequestQueue for ContestedQueue {
    fn enqueue(&self, request: WaitingRequest) -> Result<WaitingRequest, QueueError> {
        self.inner.enqueue(request)
    }

    fn pending(&self) -> Result<Vec<WaitingRequest>, QueueError> {
        self.inner.pending()
    }

    fn claim(
        &self,
        _id: &RequestId,
        _worker: &str,
        _at: DateTime<Utc>,
    ) -> Result<WaitingRequest, QueueError> {
        Err(QueueError::AlreadyClaimed)
    }

    fn complete(
        &self,
        id: &RequestId,
        worker: &str,
        result: JobResult,
        at: DateTime<Utc>,
    ) -> Result<WaitingRequest, QueueError> {
        self.inner.complete(id, worker, result, at)
    }

    fn get(&self, id: &RequestId) -> Result<Option<WaitingRequest>, QueueError> {
        self.inner.get(id)
    }

    fn release_stale(&self, cutoff: DateTime<Utc>) -> Result<usize, QueueError> {
        self.inner.release_stale(cutoff)
    }
}

pub(super) struct UnavailableQueue;

impl RequestQueue for UnavailableQueue {
    fn enqueue(&self, _request: WaitingRequest) -> Result<WaitingRequest, QueueError> {
        Err(QueueError::Unavailable("offline".to_string()))
    }

    fn pending(&self) -> Result<Vec<WaitingRequest>, QueueError> {
        Err(QueueError::Unavailable("offline".to_string()))
    }

    fn claim(
        &self,
        _id: &RequestId,
        _worker: &str,
        _at: DateTime<Utc>,
    ) -> Result<WaitingRequest, QueueError> {
        Err(QueueError::Unavailable("offline".to_string()))
    }

    fn complete(
        &self,
        _id: &RequestId,
        _worker: &str,
        _result: JobResult,
        _at: DateTime<Utc>,
    ) -> Result<WaitingRequest, QueueError> {
        Err(QueueError::Unavailable("offline".to_string()))
    }

    fn get(&self, _id: &RequestId) -> Result<Option<WaitingRequest>, QueueError> {
        Err(QueueError::Unavailable("offline".to_string()))
    }

    fn release_stale(&self, _cutoff: DateTime<Utc>) -> Result<usize, QueueError> {
        Err(QueueError::Unavailable("offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("body is json")
}
