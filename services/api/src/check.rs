use chrono::Utc;
use clap::Args;
use horde_dispatch::dispatch::{
    screen, DispatchError, EligibilityFilter, GenerationInput, ModelCatalog, ModelReference,
    PopInput, Screening, Verdict, WaitingRequest, WorkerIdentity,
};
use horde_dispatch::error::AppError;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct CheckArgs {
    /// Worker pop payload (JSON) describing the worker's capabilities
    #[arg(long)]
    pub(crate) worker: PathBuf,
    /// Generation request payload (JSON)
    #[arg(long)]
    pub(crate) request: PathBuf,
    /// Model reference file; the built-in table is used when omitted
    #[arg(long)]
    pub(crate) model_reference: Option<PathBuf>,
    /// Treat the worker as trusted
    #[arg(long)]
    pub(crate) trusted: bool,
    /// Treat the request as coming from an unsafe IP
    #[arg(long)]
    pub(crate) unsafe_origin: bool,
}

/// What a single worker/request pairing would produce on a pop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CheckOutcome {
    NoCommonModel,
    Evaluated { model: Option<String>, verdict: Verdict },
}

impl CheckOutcome {
    pub(crate) fn render(&self) -> String {
        match self {
            CheckOutcome::NoCommonModel => {
                "no model in common (silent skip, not counted)".to_string()
            }
            CheckOutcome::Evaluated { model, verdict } => {
                let mut line = verdict.summary();
                if let Some(tag) = verdict.reason().and_then(|reason| reason.skip_tag()) {
                    line.push_str(&format!(" [{}]", tag.as_str()));
                }
                match model {
                    Some(model) => format!("{model}: {line}"),
                    None => line,
                }
            }
        }
    }
}

pub(crate) fn run_check(args: CheckArgs) -> Result<(), AppError> {
    let worker: PopInput = read_json(&args.worker)?;
    let request: GenerationInput = read_json(&args.request)?;
    let catalog = match &args.model_reference {
        Some(path) => ModelCatalog::from_path(path)?,
        None => ModelCatalog::builtin(),
    };

    let outcome = check_pairing(
        worker,
        request,
        Arc::new(catalog),
        args.trusted,
        args.unsafe_origin,
    )?;
    println!("{}", outcome.render());
    Ok(())
}

pub(crate) fn check_pairing(
    worker: PopInput,
    request: GenerationInput,
    models: Arc<dyn ModelReference>,
    trusted: bool,
    unsafe_origin: bool,
) -> Result<CheckOutcome, AppError> {
    let poll = worker.validate().map_err(DispatchError::from)?;
    let generation = request.validate().map_err(DispatchError::from)?;
    let waiting = WaitingRequest::new(generation, unsafe_origin, Utc::now());
    let identity = WorkerIdentity {
        name: poll.name.clone(),
        trusted,
    };

    let model = match screen(&identity, &poll.models, &waiting.generation) {
        Screening::NoCommonModel => return Ok(CheckOutcome::NoCommonModel),
        Screening::Skipped(reason) => {
            return Ok(CheckOutcome::Evaluated {
                model: None,
                verdict: Verdict::Rejected(reason),
            })
        }
        Screening::Matched { model } => model,
    };

    let requirements = waiting.requirements_for(&model, models.as_ref());
    let verdict = EligibilityFilter::new(models).check(&poll.capabilities, &requirements);
    Ok(CheckOutcome::Evaluated {
        model: Some(model),
        verdict,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let raw = std::fs::read_to_string(path)?;
    let value = serde_json::from_str(&raw).map_err(std::io::Error::from)?;
    Ok(value)
}
