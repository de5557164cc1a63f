mod reason;
mod rules;

pub use reason::RejectReason;
pub use rules::is_eligible;

use std::sync::Arc;

use super::domain::{RequestRequirements, WorkerCapabilities};
use super::models::ModelReference;
use serde::{Deserialize, Serialize};

/// Stateless filter pairing worker capabilities with request requirements.
///
/// Holds only a read-only handle on the model reference for step budgets, so a
/// single instance can be shared across poll handlers.
#[derive(Clone)]
pub struct EligibilityFilter {
    models: Arc<dyn ModelReference>,
}

impl EligibilityFilter {
    pub fn new(models: Arc<dyn ModelReference>) -> Self {
        Self { models }
    }

    pub fn check(&self, worker: &WorkerCapabilities, request: &RequestRequirements) -> Verdict {
        let step_budget = self.models.average_steps(&request.model);
        rules::evaluate(worker, request, step_budget)
    }
}

/// Result of checking one request against one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Eligible,
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_eligible(self) -> bool {
        matches!(self, Verdict::Eligible)
    }

    pub fn reason(self) -> Option<RejectReason> {
        match self {
            Verdict::Eligible => None,
            Verdict::Rejected(reason) => Some(reason),
        }
    }

    pub fn into_pair(self) -> (bool, Option<RejectReason>) {
        (self.is_eligible(), self.reason())
    }

    pub fn summary(self) -> String {
        match self {
            Verdict::Eligible => "eligible".to_string(),
            Verdict::Rejected(reason) => format!("skipped: {}", reason.summary()),
        }
    }
}
