use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::models::{Baseline, ModelReference};
use super::queue::QueueError;

/// Identifier wrapper for queued generation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Who is polling. Trust is decided by the caller, never by the worker itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerIdentity {
    pub name: String,
    pub trusted: bool,
}

/// Restrictions a worker declares on every poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCapabilities {
    pub max_pixels: u64,
    pub blacklist: Vec<String>,
    pub allow_img2img: bool,
    pub allow_painting: bool,
    pub allow_unsafe_ipaddr: bool,
    pub allow_post_processing: bool,
    pub allow_controlnet: bool,
    pub allow_sdxl_controlnet: bool,
    pub allow_lora: bool,
    pub limit_max_steps: bool,
}

pub const DEFAULT_MAX_PIXELS: u64 = 512 * 512;

impl Default for WorkerCapabilities {
    fn default() -> Self {
        Self {
            max_pixels: DEFAULT_MAX_PIXELS,
            blacklist: Vec::new(),
            allow_img2img: true,
            allow_painting: true,
            allow_unsafe_ipaddr: true,
            allow_post_processing: true,
            allow_controlnet: true,
            allow_sdxl_controlnet: true,
            allow_lora: true,
            limit_max_steps: true,
        }
    }
}

/// What one waiting request demands from the worker that would serve it.
///
/// Built per worker because the chosen model (and with it the baseline and the
/// step budget) depends on which models the worker serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRequirements {
    pub model: String,
    pub pixel_count: u64,
    pub step_count: u32,
    pub prompt_text: String,
    pub is_img2img: bool,
    pub is_painting: bool,
    pub requests_post_processing: bool,
    pub requests_controlnet: bool,
    pub requests_sdxl_controlnet: bool,
    pub requests_lora: bool,
    pub source_ip_is_unsafe: bool,
}

/// How a supplied source image is to be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceProcessing {
    #[default]
    Img2Img,
    Inpainting,
    Outpainting,
    Remix,
}

impl SourceProcessing {
    pub const fn label(self) -> &'static str {
        match self {
            SourceProcessing::Img2Img => "img2img",
            SourceProcessing::Inpainting => "inpainting",
            SourceProcessing::Outpainting => "outpainting",
            SourceProcessing::Remix => "remix",
        }
    }

    pub const fn is_painting(self) -> bool {
        matches!(
            self,
            SourceProcessing::Inpainting | SourceProcessing::Outpainting
        )
    }
}

impl FromStr for SourceProcessing {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "img2img" => Ok(Self::Img2Img),
            "inpainting" => Ok(Self::Inpainting),
            "outpainting" => Ok(Self::Outpainting),
            "remix" => Ok(Self::Remix),
            other => Err(format!(
                "'{other}' is not one of ['img2img', 'inpainting', 'outpainting', 'remix']"
            )),
        }
    }
}

/// ControlNet preprocessors a request may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlType {
    Canny,
    Hed,
    Depth,
    Normal,
    Openpose,
    Seg,
    Scribble,
    Fakescribbles,
    Hough,
}

impl ControlType {
    pub const ALL: [ControlType; 9] = [
        ControlType::Canny,
        ControlType::Hed,
        ControlType::Depth,
        ControlType::Normal,
        ControlType::Openpose,
        ControlType::Seg,
        ControlType::Scribble,
        ControlType::Fakescribbles,
        ControlType::Hough,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ControlType::Canny => "canny",
            ControlType::Hed => "hed",
            ControlType::Depth => "depth",
            ControlType::Normal => "normal",
            ControlType::Openpose => "openpose",
            ControlType::Seg => "seg",
            ControlType::Scribble => "scribble",
            ControlType::Fakescribbles => "fakescribbles",
            ControlType::Hough => "hough",
        }
    }
}

impl FromStr for ControlType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|control| control.label() == value)
            .ok_or_else(|| format!("'{value}' is not a known control type"))
    }
}

/// Post-processors a worker may be asked to run after generation.
pub const KNOWN_POST_PROCESSORS: [&str; 8] = [
    "GFPGAN",
    "RealESRGAN_x4plus",
    "RealESRGAN_x2plus",
    "RealESRGAN_x4plus_anime_6B",
    "NMKD_Siax",
    "4x_AnimeSharp",
    "CodeFormers",
    "strip_background",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraRequest {
    pub name: String,
    pub model: f32,
    pub clip: f32,
    pub is_version: bool,
}

/// A generation request after boundary validation; every field is in range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedGeneration {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub n: u32,
    pub cfg_scale: f32,
    pub post_processing: Vec<String>,
    pub loras: Vec<LoraRequest>,
    pub control_type: Option<ControlType>,
    pub source_image: Option<String>,
    pub source_processing: SourceProcessing,
    pub source_mask: Option<String>,
    pub models: Vec<String>,
    pub workers: Vec<String>,
    pub worker_blacklist: bool,
    pub trusted_workers: bool,
    pub nsfw: bool,
    pub censor_nsfw: bool,
}

impl ValidatedGeneration {
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn is_img2img(&self) -> bool {
        self.source_image.is_some() && !self.source_processing.is_painting()
    }

    pub fn is_painting(&self) -> bool {
        self.source_image.is_some() && self.source_processing.is_painting()
    }
}

/// Claim state of a queued request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ClaimState {
    Pending,
    Claimed {
        worker: String,
        claimed_at: DateTime<Utc>,
    },
    /// Finished by the claimant. Never offered again.
    Done {
        worker: String,
        completed_at: DateTime<Utc>,
        result: JobResult,
    },
}

/// What a worker reports when it hands back a finished job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub seed: u64,
    pub censored: bool,
}

/// Queue entry: a validated request plus what the submit path learned about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitingRequest {
    pub id: RequestId,
    pub generation: ValidatedGeneration,
    pub source_ip_is_unsafe: bool,
    pub created_at: DateTime<Utc>,
    pub state: ClaimState,
}

impl WaitingRequest {
    pub fn new(
        generation: ValidatedGeneration,
        source_ip_is_unsafe: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RequestId::new(),
            generation,
            source_ip_is_unsafe,
            created_at,
            state: ClaimState::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, ClaimState::Pending)
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, ClaimState::Done { .. })
    }

    /// Moves a request claimed by `worker` to done.
    pub fn mark_done(
        &mut self,
        worker: &str,
        result: JobResult,
        at: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        match &self.state {
            ClaimState::Claimed { worker: holder, .. } if holder == worker => {}
            ClaimState::Done { .. } => return Err(QueueError::AlreadyCompleted),
            ClaimState::Pending | ClaimState::Claimed { .. } => {
                return Err(QueueError::NotClaimant)
            }
        }

        self.state = ClaimState::Done {
            worker: worker.to_string(),
            completed_at: at,
            result,
        };
        Ok(())
    }

    /// Requirements of this request when served with `model`.
    pub fn requirements_for(&self, model: &str, models: &dyn ModelReference) -> RequestRequirements {
        let generation = &self.generation;
        let requests_controlnet = generation.control_type.is_some();
        let sdxl = models
            .baseline(model)
            .map(Baseline::is_sdxl)
            .unwrap_or(false);

        RequestRequirements {
            model: model.to_string(),
            pixel_count: generation.pixel_count(),
            step_count: generation.steps,
            prompt_text: generation.prompt.clone(),
            is_img2img: generation.is_img2img(),
            is_painting: generation.is_painting(),
            requests_post_processing: !generation.post_processing.is_empty(),
            requests_controlnet,
            requests_sdxl_controlnet: requests_controlnet && sdxl,
            requests_lora: !generation.loras.is_empty(),
            source_ip_is_unsafe: self.source_ip_is_unsafe,
        }
    }
}

/// A validated poll: capabilities plus the models the worker can load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoll {
    pub name: String,
    pub models: Vec<String>,
    pub capabilities: WorkerCapabilities,
}
