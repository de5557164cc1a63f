//! Wire payloads for the generate and job-pop endpoints.
//!
//! Numeric and enum-like fields arrive as signed integers and raw strings so that
//! out-of-range values still deserialize; they are then validated once into the
//! typed domain values, collecting every problem into a field-keyed
//! [`ValidationErrors`]. Bodies that do not match these shapes at all (wrong
//! JSON types, missing required fields) are rejected by the router under the
//! `body` key.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::domain::{
    ClaimState, ControlType, JobResult, LoraRequest, RequestId, SourceProcessing,
    ValidatedGeneration, WaitingRequest, WorkerCapabilities, WorkerPoll, DEFAULT_MAX_PIXELS,
    KNOWN_POST_PROCESSORS,
};
use super::skipped::SkipCounters;

const MIN_DIMENSION: i64 = 64;
const MAX_DIMENSION: i64 = 3072;
const MAX_STEPS: i64 = 500;
const MAX_IMAGES: i64 = 20;
const MAX_NAMED_WORKERS: usize = 5;
const MAX_LORA_NAME: usize = 255;
const LORA_STRENGTH: f32 = 5.0;
const MAX_WORKER_NAME: usize = 100;

/// Field-keyed validation failures, reported together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    errors: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "input payload validation failed")?;
        for (index, (field, message)) in self.errors.iter().enumerate() {
            let sep = if index == 0 { ": " } else { "; " };
            write!(f, "{sep}{field}: {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

fn default_true() -> bool {
    true
}

fn default_dimension() -> i64 {
    512
}

fn default_steps() -> i64 {
    30
}

fn default_n() -> i64 {
    1
}

fn default_cfg_scale() -> f32 {
    7.5
}

fn default_strength() -> f32 {
    1.0
}

fn default_source_processing() -> String {
    SourceProcessing::Img2Img.label().to_string()
}

fn default_models() -> Vec<String> {
    vec!["stable_diffusion".to_string()]
}

fn default_max_pixels() -> i64 {
    DEFAULT_MAX_PIXELS as i64
}

/// Body of `POST /api/v2/generate/async`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationInput {
    pub prompt: String,
    #[serde(default)]
    pub params: GenerationParams,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default)]
    pub trusted_workers: bool,
    #[serde(default)]
    pub censor_nsfw: bool,
    #[serde(default)]
    pub workers: Vec<String>,
    #[serde(default)]
    pub worker_blacklist: bool,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub source_image: Option<String>,
    #[serde(default = "default_source_processing")]
    pub source_processing: String,
    #[serde(default)]
    pub source_mask: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default = "default_dimension")]
    pub width: i64,
    #[serde(default = "default_dimension")]
    pub height: i64,
    #[serde(default = "default_steps")]
    pub steps: i64,
    #[serde(default = "default_n")]
    pub n: i64,
    #[serde(default = "default_cfg_scale")]
    pub cfg_scale: f32,
    #[serde(default)]
    pub post_processing: Vec<String>,
    #[serde(default)]
    pub loras: Vec<LoraInput>,
    #[serde(default)]
    pub control_type: Option<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            width: default_dimension(),
            height: default_dimension(),
            steps: default_steps(),
            n: default_n(),
            cfg_scale: default_cfg_scale(),
            post_processing: Vec::new(),
            loras: Vec::new(),
            control_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraInput {
    pub name: String,
    #[serde(default = "default_strength")]
    pub model: f32,
    #[serde(default = "default_strength")]
    pub clip: f32,
    #[serde(default)]
    pub is_version: bool,
}

impl GenerationInput {
    pub fn validate(self) -> Result<ValidatedGeneration, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let params = self.params;

        if self.prompt.is_empty() {
            errors.add("prompt", "must not be empty");
        }

        let width = dimension(&mut errors, "params.width", params.width);
        let height = dimension(&mut errors, "params.height", params.height);
        let steps = bounded(&mut errors, "params.steps", params.steps, 1, MAX_STEPS);
        let n = bounded(&mut errors, "params.n", params.n, 1, MAX_IMAGES);

        if !(0.0..=100.0).contains(&params.cfg_scale) {
            errors.add("params.cfg_scale", "must be between 0 and 100");
        }

        let mut seen = BTreeSet::new();
        for processor in &params.post_processing {
            if !KNOWN_POST_PROCESSORS.contains(&processor.as_str()) {
                errors.add(
                    "params.post_processing",
                    format!("'{processor}' is not a known post-processor"),
                );
            } else if !seen.insert(processor.as_str()) {
                errors.add(
                    "params.post_processing",
                    format!("'{processor}' is listed more than once"),
                );
            }
        }

        let mut lora_names = BTreeSet::new();
        let mut loras = Vec::with_capacity(params.loras.len());
        for (index, lora) in params.loras.into_iter().enumerate() {
            let field = format!("params.loras.{index}");
            let length = lora.name.chars().count();
            if length == 0 || length > MAX_LORA_NAME {
                errors.add(
                    format!("{field}.name"),
                    format!("must be between 1 and {MAX_LORA_NAME} characters"),
                );
            } else if !lora_names.insert(lora.name.clone()) {
                errors.add(format!("{field}.name"), "is listed more than once");
            }
            for (strength_field, strength) in [("model", lora.model), ("clip", lora.clip)] {
                if !(-LORA_STRENGTH..=LORA_STRENGTH).contains(&strength) {
                    errors.add(
                        format!("{field}.{strength_field}"),
                        format!("must be between -{LORA_STRENGTH} and {LORA_STRENGTH}"),
                    );
                }
            }
            loras.push(LoraRequest {
                name: lora.name,
                model: lora.model,
                clip: lora.clip,
                is_version: lora.is_version,
            });
        }

        let control_type = match params.control_type.as_deref() {
            None => None,
            Some(raw) => match raw.parse::<ControlType>() {
                Ok(control) => Some(control),
                Err(message) => {
                    errors.add("params.control_type", message);
                    None
                }
            },
        };

        let source_processing = match self.source_processing.parse::<SourceProcessing>() {
            Ok(processing) => processing,
            Err(message) => {
                errors.add("source_processing", message);
                SourceProcessing::default()
            }
        };

        if self.source_image.as_deref().is_some_and(str::is_empty) {
            errors.add("source_image", "must not be empty when provided");
        }

        if self.workers.len() > MAX_NAMED_WORKERS {
            errors.add(
                "workers",
                format!("at most {MAX_NAMED_WORKERS} workers may be specified"),
            );
        }

        if self.models.iter().any(|model| model.trim().is_empty()) {
            errors.add("models", "model names must not be blank");
        }

        let validated = ValidatedGeneration {
            prompt: self.prompt,
            width,
            height,
            steps,
            n,
            cfg_scale: params.cfg_scale,
            post_processing: params.post_processing,
            loras,
            control_type,
            source_image: self.source_image,
            source_processing,
            source_mask: self.source_mask,
            models: self.models,
            workers: self.workers,
            worker_blacklist: self.worker_blacklist,
            trusted_workers: self.trusted_workers,
            nsfw: self.nsfw,
            censor_nsfw: self.censor_nsfw,
        };

        errors.into_result(validated)
    }
}

fn bounded(errors: &mut ValidationErrors, field: &str, value: i64, min: i64, max: i64) -> u32 {
    if (min..=max).contains(&value) {
        value as u32
    } else {
        errors.add(field, format!("must be between {min} and {max}"));
        0
    }
}

fn dimension(errors: &mut ValidationErrors, field: &str, value: i64) -> u32 {
    let checked = bounded(errors, field, value, MIN_DIMENSION, MAX_DIMENSION);
    if checked != 0 && value % MIN_DIMENSION != 0 {
        errors.add(field, format!("must be a multiple of {MIN_DIMENSION}"));
    }
    checked
}

/// Body of `POST /api/v2/generate/pop`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopInput {
    pub name: String,
    #[serde(default = "default_models")]
    pub models: Vec<String>,
    #[serde(default = "default_max_pixels")]
    pub max_pixels: i64,
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default = "default_true")]
    pub allow_img2img: bool,
    #[serde(default = "default_true")]
    pub allow_painting: bool,
    #[serde(default = "default_true")]
    pub allow_unsafe_ipaddr: bool,
    #[serde(default = "default_true")]
    pub allow_post_processing: bool,
    #[serde(default = "default_true")]
    pub allow_controlnet: bool,
    #[serde(default = "default_true")]
    pub allow_sdxl_controlnet: bool,
    #[serde(default = "default_true")]
    pub allow_lora: bool,
    #[serde(default = "default_true")]
    pub limit_max_steps: bool,
}

impl PopInput {
    /// A poll from `name` that accepts everything with default limits.
    pub fn named(name: impl Into<String>) -> Self {
        let defaults = WorkerCapabilities::default();
        Self {
            name: name.into(),
            models: default_models(),
            max_pixels: default_max_pixels(),
            blacklist: defaults.blacklist,
            allow_img2img: defaults.allow_img2img,
            allow_painting: defaults.allow_painting,
            allow_unsafe_ipaddr: defaults.allow_unsafe_ipaddr,
            allow_post_processing: defaults.allow_post_processing,
            allow_controlnet: defaults.allow_controlnet,
            allow_sdxl_controlnet: defaults.allow_sdxl_controlnet,
            allow_lora: defaults.allow_lora,
            limit_max_steps: defaults.limit_max_steps,
        }
    }

    pub fn validate(self) -> Result<WorkerPoll, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let name = worker_name(&mut errors, &self.name);

        if self.models.is_empty() {
            errors.add("models", "at least one model must be offered");
        } else if self.models.iter().any(|model| model.trim().is_empty()) {
            errors.add("models", "model names must not be blank");
        }

        let max_pixels = if self.max_pixels > 0 {
            self.max_pixels as u64
        } else {
            errors.add("max_pixels", "must be a positive integer");
            0
        };

        let poll = WorkerPoll {
            name,
            models: self.models,
            capabilities: WorkerCapabilities {
                max_pixels,
                blacklist: self.blacklist,
                allow_img2img: self.allow_img2img,
                allow_painting: self.allow_painting,
                allow_unsafe_ipaddr: self.allow_unsafe_ipaddr,
                allow_post_processing: self.allow_post_processing,
                allow_controlnet: self.allow_controlnet,
                allow_sdxl_controlnet: self.allow_sdxl_controlnet,
                allow_lora: self.allow_lora,
                limit_max_steps: self.limit_max_steps,
            },
        };

        errors.into_result(poll)
    }
}

fn worker_name(errors: &mut ValidationErrors, raw: &str) -> String {
    let name = raw.trim().to_string();
    if name.is_empty() || name.chars().count() > MAX_WORKER_NAME {
        errors.add(
            "name",
            format!("must be between 1 and {MAX_WORKER_NAME} characters"),
        );
    }
    name
}

/// Body of `POST /api/v2/generate/submit`: a worker handing back a job it popped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSubmitInput {
    pub id: RequestId,
    pub name: String,
    pub seed: i64,
    #[serde(default)]
    pub censored: bool,
}

/// A validated job hand-back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCompletion {
    pub id: RequestId,
    pub worker: String,
    pub result: JobResult,
}

impl JobSubmitInput {
    pub fn validate(self) -> Result<JobCompletion, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let worker = worker_name(&mut errors, &self.name);

        let seed = u64::try_from(self.seed).unwrap_or_else(|_| {
            errors.add("seed", "must be a non-negative integer");
            0
        });

        let completion = JobCompletion {
            id: self.id,
            worker,
            result: JobResult {
                seed,
                censored: self.censored,
            },
        };
        errors.into_result(completion)
    }
}

/// Progress of one request as reported by the status and job-submit endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStatus {
    pub id: RequestId,
    pub waiting: bool,
    pub processing: bool,
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub censored: Option<bool>,
}

impl From<&WaitingRequest> for RequestStatus {
    fn from(request: &WaitingRequest) -> Self {
        let mut status = Self {
            id: request.id,
            waiting: false,
            processing: false,
            done: false,
            worker: None,
            seed: None,
            censored: None,
        };
        match &request.state {
            ClaimState::Pending => status.waiting = true,
            ClaimState::Claimed { worker, .. } => {
                status.processing = true;
                status.worker = Some(worker.clone());
            }
            ClaimState::Done { worker, result, .. } => {
                status.done = true;
                status.worker = Some(worker.clone());
                status.seed = Some(result.seed);
                status.censored = Some(result.censored);
            }
        }
        status
    }
}

/// Response to an accepted generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Generation parameters handed to the worker that claimed a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationPayload {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub ddim_steps: u32,
    pub n_iter: u32,
    pub cfg_scale: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_processing: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loras: Vec<LoraRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_type: Option<ControlType>,
    pub use_nsfw_censor: bool,
}

/// Body returned from a job pop; `id` is absent when nothing was eligible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    #[serde(default)]
    pub ids: Vec<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<GenerationPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_processing: Option<SourceProcessing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_mask: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
    pub skipped: SkipCounters,
}

impl PopResponse {
    pub fn empty(skipped: SkipCounters) -> Self {
        Self {
            id: None,
            ids: Vec::new(),
            model: None,
            payload: None,
            source_image: None,
            source_processing: None,
            source_mask: None,
            ttl: None,
            skipped,
        }
    }

    pub fn job(request: WaitingRequest, model: String, ttl: u32, skipped: SkipCounters) -> Self {
        let generation = request.generation;
        // SFW requests are always censored; NSFW ones only when asked.
        let use_nsfw_censor = !generation.nsfw || generation.censor_nsfw;
        let source_processing = generation
            .source_image
            .as_ref()
            .map(|_| generation.source_processing);

        Self {
            id: Some(request.id),
            ids: vec![request.id],
            model: Some(model),
            payload: Some(GenerationPayload {
                prompt: generation.prompt,
                width: generation.width,
                height: generation.height,
                ddim_steps: generation.steps,
                n_iter: generation.n,
                cfg_scale: generation.cfg_scale,
                post_processing: generation.post_processing,
                loras: generation.loras,
                control_type: generation.control_type,
                use_nsfw_censor,
            }),
            source_image: generation.source_image,
            source_processing,
            source_mask: generation.source_mask,
            ttl: Some(ttl),
            skipped,
        }
    }

    pub fn has_job(&self) -> bool {
        self.id.is_some()
    }
}
