use crate::cli::ServeArgs;
use crate::infra::{load_model_catalog, AppState, InMemoryRequestQueue};
use crate::routes::with_dispatch_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use horde_dispatch::config::AppConfig;
use horde_dispatch::dispatch::{DispatchService, StaticIpRisk};
use horde_dispatch::error::AppError;
use horde_dispatch::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let catalog = load_model_catalog(&config.dispatch)?;
    let risk = StaticIpRisk::new(config.dispatch.unsafe_ips.iter().copied());
    let service = Arc::new(DispatchService::new(
        Arc::new(InMemoryRequestQueue::default()),
        Arc::new(catalog),
        Arc::new(risk),
        config.dispatch.settings(),
    ));

    let settings = service.settings().clone();
    let app = with_dispatch_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        trusted_workers = settings.trusted_workers.len(),
        job_ttl_secs = settings.job_ttl_secs,
        "job dispatcher ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
