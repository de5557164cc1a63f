use std::net::IpAddr;
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use super::domain::RequestId;
use super::payload::{GenerationInput, JobSubmitInput, PopInput, ValidationErrors};
use super::queue::{QueueError, RequestQueue};
use super::service::{DispatchError, DispatchService};

/// Router builder exposing the generate, job-pop, job-submit and status endpoints.
pub fn dispatch_router<Q>(service: Arc<DispatchService<Q>>) -> Router
where
    Q: RequestQueue + 'static,
{
    Router::new()
        .route("/api/v2/generate/async", post(submit_handler::<Q>))
        .route("/api/v2/generate/pop", post(pop_handler::<Q>))
        .route("/api/v2/generate/submit", post(job_submit_handler::<Q>))
        .route("/api/v2/generate/status/:id", get(status_handler::<Q>))
        .with_state(service)
}

pub(crate) async fn submit_handler<Q>(
    State(service): State<Arc<DispatchService<Q>>>,
    headers: HeaderMap,
    payload: Result<Json<GenerationInput>, JsonRejection>,
) -> Response
where
    Q: RequestQueue + 'static,
{
    let Json(input) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response("body", rejection.body_text()),
    };
    let client_addr = forwarded_for(&headers);
    match service.submit(input, client_addr) {
        Ok(accepted) => (StatusCode::ACCEPTED, Json(accepted)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn pop_handler<Q>(
    State(service): State<Arc<DispatchService<Q>>>,
    payload: Result<Json<PopInput>, JsonRejection>,
) -> Response
where
    Q: RequestQueue + 'static,
{
    let Json(input) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response("body", rejection.body_text()),
    };
    match service.pop(input) {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn job_submit_handler<Q>(
    State(service): State<Arc<DispatchService<Q>>>,
    payload: Result<Json<JobSubmitInput>, JsonRejection>,
) -> Response
where
    Q: RequestQueue + 'static,
{
    let Json(input) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response("body", rejection.body_text()),
    };
    match service.complete(input) {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn status_handler<Q>(
    State(service): State<Arc<DispatchService<Q>>>,
    id: Result<Path<RequestId>, PathRejection>,
) -> Response
where
    Q: RequestQueue + 'static,
{
    let Path(id) = match id {
        Ok(id) => id,
        Err(rejection) => return rejection_response("id", rejection.body_text()),
    };
    match service.status(&id) {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(err) => error_response(err),
    }
}

/// First hop of `X-Forwarded-For`, if it parses.
pub(crate) fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse().ok())
}

pub(crate) fn validation_body(errors: &ValidationErrors) -> serde_json::Value {
    json!({
        "message": "Input payload validation failed",
        "errors": errors.errors(),
    })
}

fn rejection_response(field: &str, detail: String) -> Response {
    let mut errors = ValidationErrors::default();
    errors.add(field, detail);
    (StatusCode::BAD_REQUEST, Json(validation_body(&errors))).into_response()
}

fn error_response(err: DispatchError) -> Response {
    match err {
        DispatchError::Validation(errors) => {
            (StatusCode::BAD_REQUEST, Json(validation_body(&errors))).into_response()
        }
        DispatchError::Queue(QueueError::Unavailable(detail)) => {
            let payload = json!({ "message": format!("queue unavailable: {detail}") });
            (StatusCode::SERVICE_UNAVAILABLE, Json(payload)).into_response()
        }
        DispatchError::Queue(other) => {
            let status = match other {
                QueueError::NotFound => StatusCode::NOT_FOUND,
                QueueError::Conflict
                | QueueError::AlreadyClaimed
                | QueueError::NotClaimant
                | QueueError::AlreadyCompleted => StatusCode::CONFLICT,
                QueueError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            };
            let payload = json!({ "message": other.to_string() });
            (status, Json(payload)).into_response()
        }
    }
}
