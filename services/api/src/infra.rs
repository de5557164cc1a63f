use chrono::{DateTime, Utc};
use horde_dispatch::config::DispatchConfig;
use horde_dispatch::dispatch::{
    ClaimState, JobResult, ModelCatalog, QueueError, RequestId, RequestQueue, WaitingRequest,
};
use horde_dispatch::error::AppError;
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Process-local queue. Claims are serialized by the mutex.
#[derive(Default, Clone)]
pub(crate) struct InMemoryRequestQueue {
    requests: Arc<Mutex<HashMap<RequestId, WaitingRequest>>>,
}

impl InMemoryRequestQueue {
    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<RequestId, WaitingRequest>>, QueueError> {
        self.requests
            .lock()
            .map_err(|_| QueueError::Unavailable("request queue mutex poisoned".to_string()))
    }
}

impl RequestQueue for InMemoryRequestQueue {
    fn enqueue(&self, request: WaitingRequest) -> Result<WaitingRequest, QueueError> {
        let mut guard = self.lock()?;
        if guard.contains_key(&request.id) {
            return Err(QueueError::Conflict);
        }
        guard.insert(request.id, request.clone());
        Ok(request)
    }

    fn pending(&self) -> Result<Vec<WaitingRequest>, QueueError> {
        let guard = self.lock()?;
        let mut pending: Vec<_> = guard
            .values()
            .filter(|request| request.is_pending())
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(pending)
    }

    fn claim(
        &self,
        id: &RequestId,
        worker: &str,
        at: DateTime<Utc>,
    ) -> Result<WaitingRequest, QueueError> {
        let mut guard = self.lock()?;
        let request = guard.get_mut(id).ok_or(QueueError::NotFound)?;
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
        let mut guard = self.lock()?;
        let request = guard.get_mut(id).ok_or(QueueError::NotFound)?;
        request.mark_done(worker, result, at)?;
        Ok(request.clone())
    }

    fn get(&self, id: &RequestId) -> Result<Option<WaitingRequest>, QueueError> {
        let guard = self.lock()?;
        Ok(guard.get(id).cloned())
    }

    fn release_stale(&self, cutoff: DateTime<Utc>) -> Result<usize, QueueError> {
        let mut guard = self.lock()?;
        let mut released = 0;
        for request in guard.values_mut() {
            let expired = matches!(
                request.state,
                ClaimState::Claimed { claimed_at, .. } if claimed_at < cutoff
            );
            if expired {
                request.state = ClaimState::Pending;
                released += 1;
            }
        }
        Ok(released)
    }
}

/// Loads the configured reference file, or the built-in table when none is set.
pub(crate) fn load_model_catalog(config: &DispatchConfig) -> Result<ModelCatalog, AppError> {
    match &config.model_reference {
        Some(path) => {
            let catalog = ModelCatalog::from_path(path)?;
            info!(path = %path.display(), models = catalog.len(), "loaded model reference");
            Ok(catalog)
        }
        None => Ok(ModelCatalog::builtin()),
    }
}
