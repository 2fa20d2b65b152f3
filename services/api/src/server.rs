use crate::cli::ServeArgs;
use crate::infra::{AppState, ConfiguredSigningProvider, InMemoryCaseRepository, InMemorySessionStore};
use crate::routes::with_recovery_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use recovery_docs::config::AppConfig;
use recovery_docs::error::AppError;
use recovery_docs::telemetry;
use recovery_docs::workflows::recovery::{RecoveryCaseService, SessionRegistry};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

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

    let repository = Arc::new(InMemoryCaseRepository::default());
    let provider = Arc::new(ConfiguredSigningProvider::from_kind(config.signing.provider));
    let recovery_service = Arc::new(RecoveryCaseService::with_timeout(
        repository,
        provider,
        config.signing.timeout,
    ));
    let sessions = Arc::new(SessionRegistry::new(
        Arc::new(InMemorySessionStore::default()),
        config.sessions.ttl(),
    ));

    if let Some(agent_email) = args.agent_email.take() {
        match sessions.open(&agent_email, Utc::now()) {
            Ok(session) => {
                println!("session token for {}: {}", session.agent_email, session.token.0);
                info!(agent = %session.agent_email, expires_at = %session.expires_at, "agent session opened");
            }
            Err(err) => warn!(error = %err, "could not open agent session"),
        }
    }

    let app = with_recovery_routes(
        recovery_service,
        sessions,
        config.sessions.require_session,
    )
    .layer(Extension(app_state))
    .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        provider = ?config.signing.provider,
        require_session = config.sessions.require_session,
        "recovery document service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
