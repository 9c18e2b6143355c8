use crate::cli::ServeArgs;
use crate::infra::{
    AppState, FileDossierGenerator, InMemoryCandidatureRepository, LocalBoardCrm, OutboxNotifier,
};
use crate::routes::with_candidature_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use katapult::config::AppConfig;
use katapult::error::AppError;
use katapult::telemetry;
use katapult::workflows::candidature::{
    CandidatureService, CrmFieldMapping, CrmSync, MondayBoardClient,
};
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

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let repository = Arc::new(InMemoryCandidatureRepository::default());
    let notifier = Arc::new(OutboxNotifier::default());
    let dossiers = Arc::new(FileDossierGenerator::new(config.engine.dossier_dir.clone()));
    let crm: Arc<dyn CrmSync> = match config.monday.clone() {
        Some(settings) => {
            info!(board = %settings.board_id, "Monday.com board sync enabled");
            Arc::new(MondayBoardClient::new(settings, CrmFieldMapping::default()))
        }
        None => {
            info!("no Monday.com credentials configured, using the local board");
            Arc::new(LocalBoardCrm::default())
        }
    };
    let candidature_service = Arc::new(CandidatureService::new(
        repository,
        notifier,
        dossiers,
        crm,
        config.engine.clone(),
    ));

    let app = with_candidature_routes(candidature_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "katapult candidature service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
