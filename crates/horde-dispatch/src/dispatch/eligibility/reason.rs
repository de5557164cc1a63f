use serde::{Deserialize, Serialize};

use crate::dispatch::skipped::SkipTag;

/// Why a waiting request was not offered to a polling worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The request names workers and this one is excluded.
    WorkerId,
    /// The request wants trusted workers only.
    Untrusted,
    UnsafeIp,
    Img2Img,
    Painting,
    MaxPixels,
    StepCount,
    PostProcessing,
    Controlnet,
    SdxlControlnet,
    Lora,
    Blacklist,
}

impl RejectReason {
    pub const fn tag(self) -> &'static str {
        match self {
            RejectReason::WorkerId => "worker_id",
            RejectReason::Untrusted => "untrusted",
            RejectReason::UnsafeIp => "unsafe_ip",
            RejectReason::Img2Img => "img2img",
            RejectReason::Painting => "painting",
            RejectReason::MaxPixels => "max_pixels",
            RejectReason::StepCount => "step_count",
            RejectReason::PostProcessing => "post-processing",
            RejectReason::Controlnet => "controlnet",
            RejectReason::SdxlControlnet => "sdxl_controlnet",
            RejectReason::Lora => "lora",
            RejectReason::Blacklist => "blacklist",
        }
    }

    /// Counter this reason is reported under. Blacklist hits are not reported.
    pub const fn skip_tag(self) -> Option<SkipTag> {
        match self {
            RejectReason::WorkerId => Some(SkipTag::WorkerId),
            RejectReason::Untrusted => Some(SkipTag::Untrusted),
            RejectReason::UnsafeIp => Some(SkipTag::UnsafeIp),
            RejectReason::Img2Img => Some(SkipTag::Img2Img),
            RejectReason::Painting => Some(SkipTag::Painting),
            RejectReason::MaxPixels => Some(SkipTag::MaxPixels),
            RejectReason::StepCount => Some(SkipTag::StepCount),
            RejectReason::PostProcessing => Some(SkipTag::PostProcessing),
            RejectReason::Controlnet | RejectReason::SdxlControlnet => Some(SkipTag::Controlnet),
            RejectReason::Lora => Some(SkipTag::Lora),
            RejectReason::Blacklist => None,
        }
    }

    pub fn summary(self) -> String {
        match self {
            RejectReason::WorkerId => "request is restricted to other workers".to_string(),
            RejectReason::Untrusted => "request requires a trusted worker".to_string(),
            RejectReason::UnsafeIp => "request came from an unsafe IP".to_string(),
            RejectReason::Img2Img => "request needs img2img".to_string(),
            RejectReason::Painting => "request needs inpainting/outpainting".to_string(),
            RejectReason::MaxPixels => "request is larger than the worker's max pixels".to_string(),
            RejectReason::StepCount => {
                "request has more steps than the model average".to_string()
            }
            RejectReason::PostProcessing => "request needs post-processing".to_string(),
            RejectReason::Controlnet => "request needs ControlNet".to_string(),
            RejectReason::SdxlControlnet => "request needs SDXL ControlNet".to_string(),
            RejectReason::Lora => "request needs LoRas".to_string(),
            RejectReason::Blacklist => "prompt contains a blacklisted word".to_string(),
        }
    }
}
