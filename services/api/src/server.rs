use crate::cli::ServeArgs;
use crate::infra::{bootstrap_admin, seed_demo, AppState};
use crate::routes::with_housing_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use pg_housing::config::AppConfig;
use pg_housing::error::AppError;
use pg_housing::housing::{HousingService, MemoryStore};
use pg_housing::telemetry;
use std::sync::atomic::Ordering;
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
    if args.seed_demo {
        config.housing.seed_demo = true;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(MemoryStore::new());
    let housing_service = Arc::new(HousingService::new(store));
    let admin = bootstrap_admin(&housing_service, &config.housing)?;
    info!(admin_id = %admin.id, "bootstrap admin available");
    if config.housing.seed_demo {
        seed_demo(&housing_service, admin)?;
    }

    let app = with_housing_routes(housing_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "pg housing engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}
