use super::domain::{ValidatedGeneration, WorkerIdentity};
use super::eligibility::RejectReason;

/// Outcome of the checks that run before capability filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screening {
    /// Worker and request can meet on `model`.
    Matched { model: String },
    Skipped(RejectReason),
    /// No model in common. Not reported to the worker.
    NoCommonModel,
}

/// Applies the worker-selection and trust rules carried by the request, then
/// picks the first worker model the request accepts.
pub fn screen(
    worker: &WorkerIdentity,
    worker_models: &[String],
    request: &ValidatedGeneration,
) -> Screening {
    if !request.workers.is_empty() {
        let named = request.workers.iter().any(|name| name == &worker.name);
        if named == request.worker_blacklist {
            return Screening::Skipped(RejectReason::WorkerId);
        }
    }

    if request.trusted_workers && !worker.trusted {
        return Screening::Skipped(RejectReason::Untrusted);
    }

    let model = worker_models
        .iter()
        .find(|model| request.models.is_empty() || request.models.contains(model));

    match model {
        Some(model) => Screening::Matched {
            model: model.clone(),
        },
        None => Screening::NoCommonModel,
    }
}
