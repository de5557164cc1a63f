use std::sync::Arc;

use super::common::*;
use crate::dispatch::domain::WorkerCapabilities;
use crate::dispatch::eligibility::{is_eligible, EligibilityFilter, RejectReason, Verdict};

#[test]
fn permissive_worker_accepts_plain_request() {
    let (eligible, reason) = is_eligible(&permissive_worker(), &plain_request(), Some(60));
    assert!(eligible);
    assert_eq!(reason, None);
}

#[test]
fn permissive_worker_accepts_request_using_every_feature() {
    let mut request = plain_request();
    request.is_img2img = true;
    request.requests_post_processing = true;
    request.requests_controlnet = true;
    request.requests_sdxl_controlnet = true;
    request.requests_lora = true;
    request.source_ip_is_unsafe = true;
    request.pixel_count = 1024 * 1024;

    let (eligible, reason) = is_eligible(&permissive_worker(), &request, Some(10));
    assert!(eligible, "unexpected rejection {reason:?}");
}

#[test]
fn oversized_request_reports_max_pixels_over_later_checks() {
    let worker = WorkerCapabilities {
        max_pixels: 512 * 512,
        allow_post_processing: false,
        allow_controlnet: false,
        allow_lora: false,
        blacklist: vec!["lighthouse".to_string()],
        ..permissive_worker()
    };
    let mut request = plain_request();
    request.pixel_count = 768 * 768;
    request.requests_post_processing = true;
    request.requests_controlnet = true;
    request.requests_lora = true;

    assert_eq!(
        is_eligible(&worker, &request, Some(60)),
        (false, Some(RejectReason::MaxPixels))
    );
}

#[test]
fn img2img_is_checked_before_pixels() {
    let worker = WorkerCapabilities {
        max_pixels: 262_144,
        allow_img2img: false,
        ..permissive_worker()
    };
    let mut request = plain_request();
    request.pixel_count = 262_144;
    request.is_img2img = true;

    assert_eq!(
        is_eligible(&worker, &request, Some(60)),
        (false, Some(RejectReason::Img2Img))
    );

    request.pixel_count = 262_145;
    assert_eq!(
        is_eligible(&worker, &request, Some(60)).1,
        Some(RejectReason::Img2Img)
    );
}

#[test]
fn unsafe_ip_wins_over_everything() {
    let worker = WorkerCapabilities {
        allow_unsafe_ipaddr: false,
        allow_img2img: false,
        allow_painting: false,
        max_pixels: 64 * 64,
        ..permissive_worker()
    };
    let mut request = plain_request();
    request.source_ip_is_unsafe = true;
    request.is_img2img = true;

    assert_eq!(
        is_eligible(&worker, &request, None).1,
        Some(RejectReason::UnsafeIp)
    );
}

#[test]
fn painting_is_gated_separately_from_img2img() {
    let worker = WorkerCapabilities {
        allow_painting: false,
        ..permissive_worker()
    };
    let mut request = plain_request();
    request.is_painting = true;

    assert_eq!(
        is_eligible(&worker, &request, None).1,
        Some(RejectReason::Painting)
    );

    request.is_painting = false;
    request.is_img2img = true;
    assert!(is_eligible(&worker, &request, None).0);
}

#[test]
fn step_limit_applies_only_when_worker_asks_for_it() {
    let mut request = plain_request();
    request.step_count = 80;

    let limited = WorkerCapabilities {
        limit_max_steps: true,
        ..permissive_worker()
    };
    assert_eq!(
        is_eligible(&limited, &request, Some(60)),
        (false, Some(RejectReason::StepCount))
    );

    assert!(is_eligible(&permissive_worker(), &request, Some(60)).0);
}

#[test]
fn step_limit_is_inclusive_and_ignores_unknown_budgets() {
    let limited = WorkerCapabilities {
        limit_max_steps: true,
        ..permissive_worker()
    };
    let mut request = plain_request();
    request.step_count = 60;
    assert!(is_eligible(&limited, &request, Some(60)).0);

    request.step_count = 500;
    assert!(is_eligible(&limited, &request, None).0);
}

#[test]
fn feature_gates_follow_fixed_order() {
    let worker = WorkerCapabilities {
        allow_post_processing: false,
        allow_controlnet: false,
        allow_sdxl_controlnet: false,
        allow_lora: false,
        ..permissive_worker()
    };
    let mut request = plain_request();
    request.requests_lora = true;
    assert_eq!(is_eligible(&worker, &request, None).1, Some(RejectReason::Lora));

    request.requests_sdxl_controlnet = true;
    assert_eq!(
        is_eligible(&worker, &request, None).1,
        Some(RejectReason::SdxlControlnet)
    );

    request.requests_controlnet = true;
    assert_eq!(
        is_eligible(&worker, &request, None).1,
        Some(RejectReason::Controlnet)
    );

    request.requests_post_processing = true;
    assert_eq!(
        is_eligible(&worker, &request, None).1,
        Some(RejectReason::PostProcessing)
    );
}

#[test]
fn sdxl_controlnet_needs_its_own_opt_in() {
    let worker = WorkerCapabilities {
        allow_controlnet: true,
        allow_sdxl_controlnet: false,
        ..permissive_worker()
    };
    let mut request = plain_request();
    request.requests_controlnet = true;
    assert!(is_eligible(&worker, &request, None).0);

    request.requests_sdxl_controlnet = true;
    assert_eq!(
        is_eligible(&worker, &request, None).1,
        Some(RejectReason::SdxlControlnet)
    );
}

#[test]
fn blacklist_matches_case_insensitive_substrings() {
    let worker = WorkerCapabilities {
        blacklist: vec!["foo".to_string()],
        ..permissive_worker()
    };
    let mut request = plain_request();
    request.prompt_text = "a FooBar on a table".to_string();

    assert_eq!(
        is_eligible(&worker, &request, None),
        (false, Some(RejectReason::Blacklist))
    );
}

#[test]
fn blacklist_without_hits_accepts() {
    let worker = WorkerCapabilities {
        blacklist: vec!["gore".to_string(), "  ".to_string(), String::new()],
        ..permissive_worker()
    };

    assert_eq!(is_eligible(&worker, &plain_request(), None), (true, None));
}

#[test]
fn blacklist_is_the_last_check() {
    let worker = WorkerCapabilities {
        blacklist: vec!["lighthouse".to_string()],
        allow_lora: false,
        ..permissive_worker()
    };
    let mut request = plain_request();
    request.requests_lora = true;

    assert_eq!(is_eligible(&worker, &request, None).1, Some(RejectReason::Lora));
}

#[test]
fn repeated_checks_agree() {
    let worker = WorkerCapabilities {
        limit_max_steps: true,
        allow_lora: false,
        ..permissive_worker()
    };
    let mut request = plain_request();
    request.requests_lora = true;

    let first = is_eligible(&worker, &request, Some(60));
    let second = is_eligible(&worker, &request, Some(60));
    assert_eq!(first, second);
}

#[test]
fn filter_resolves_step_budget_from_model_reference() {
    let filter = EligibilityFilter::new(Arc::new(catalog()));
    let worker = WorkerCapabilities {
        limit_max_steps: true,
        ..permissive_worker()
    };

    let mut request = plain_request();
    request.step_count = 50;
    assert_eq!(filter.check(&worker, &request), Verdict::Eligible);

    request.model = "SDXL 1.0".to_string();
    assert_eq!(
        filter.check(&worker, &request),
        Verdict::Rejected(RejectReason::StepCount)
    );

    request.model = "unlisted".to_string();
    assert!(filter.check(&worker, &request).is_eligible());
}

#[test]
fn verdict_summaries_name_the_reason() {
    let verdict = Verdict::Rejected(RejectReason::MaxPixels);
    assert!(verdict.summary().contains("max pixels"));
    assert_eq!(Verdict::Eligible.summary(), "eligible");
}
