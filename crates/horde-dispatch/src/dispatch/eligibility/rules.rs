use super::super::domain::{RequestRequirements, WorkerCapabilities};
use super::reason::RejectReason;
use super::Verdict;

/// Decides whether `worker` may be offered `request`.
///
/// `step_budget` is the average step count of the request's model, if the model
/// reference knows it. Checks run in a fixed order and the first failure is the
/// reported reason.
pub fn is_eligible(
    worker: &WorkerCapabilities,
    request: &RequestRequirements,
    step_budget: Option<u32>,
) -> (bool, Option<RejectReason>) {
    evaluate(worker, request, step_budget).into_pair()
}

pub(crate) fn evaluate(
    worker: &WorkerCapabilities,
    request: &RequestRequirements,
    step_budget: Option<u32>,
) -> Verdict {
    if request.source_ip_is_unsafe && !worker.allow_unsafe_ipaddr {
        return Verdict::Rejected(RejectReason::UnsafeIp);
    }

    if request.is_img2img && !worker.allow_img2img {
        return Verdict::Rejected(RejectReason::Img2Img);
    }

    if request.is_painting && !worker.allow_painting {
        return Verdict::Rejected(RejectReason::Painting);
    }

    if request.pixel_count > worker.max_pixels {
        return Verdict::Rejected(RejectReason::MaxPixels);
    }

    // Unknown models carry no budget and so never trip the step limit.
    if worker.limit_max_steps {
        if let Some(budget) = step_budget {
            if request.step_count > budget {
                return Verdict::Rejected(RejectReason::StepCount);
            }
        }
    }

    if request.requests_post_processing && !worker.allow_post_processing {
        return Verdict::Rejected(RejectReason::PostProcessing);
    }

    if request.requests_controlnet && !worker.allow_controlnet {
        return Verdict::Rejected(RejectReason::Controlnet);
    }

    if request.requests_sdxl_controlnet && !worker.allow_sdxl_controlnet {
        return Verdict::Rejected(RejectReason::SdxlControlnet);
    }

    if request.requests_lora && !worker.allow_lora {
        return Verdict::Rejected(RejectReason::Lora);
    }

    if prompt_is_blacklisted(&request.prompt_text, &worker.blacklist) {
        return Verdict::Rejected(RejectReason::Blacklist);
    }

    Verdict::Eligible
}

/// Case-insensitive substring match of any non-blank blacklist entry.
pub(crate) fn prompt_is_blacklisted(prompt: &str, blacklist: &[String]) -> bool {
    if blacklist.is_empty() {
        return false;
    }

    let prompt = prompt.to_lowercase();
    blacklist
        .iter()
        .map(|word| word.trim())
        .filter(|word| !word.is_empty())
        .any(|word| prompt.contains(&word.to_lowercase()))
}
