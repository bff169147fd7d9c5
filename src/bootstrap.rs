use std::sync::Arc;

use axum::Router;
use tokio::{net::TcpListener, sync::watch};
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    application::{
        audit_consumer::AuditConsumer, audit_service::AuditService, event_publisher::EventPublisher,
    },
    config::AppConfig,
    domain::audit::AuditRepository,
    infrastructure::{
        kafka::{KafkaChannel, spawn_consumer},
        postgres::{build_pg_pool, repositories::PgAuditRepository},
    },
    interfaces::http::router::build_router,
    state::AppState,
};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Arc::new(AppConfig::load()?);

    let pg_pool = build_pg_pool(&config.postgres).await?;
    let kafka_cfg = Arc::new(config.kafka.clone());
    let channel = Arc::new(KafkaChannel::new(&config.kafka)?);

    let audit_repo: Arc<dyn AuditRepository> = Arc::new(PgAuditRepository::new(pg_pool.clone()));
    let audit_service = Arc::new(AuditService::new(audit_repo));
    let publisher = Arc::new(EventPublisher::new(channel, config.kafka.topic.clone()));
    let audit_consumer = AuditConsumer::new(
        audit_service.clone(),
        config.audit.consumer_source.clone(),
        config.kafka.commit_mode,
    )
    .with_max_attempts(config.kafka.max_attempts);
    let audit_consumer = Arc::new(audit_consumer);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer_handle = spawn_consumer(kafka_cfg, audit_consumer, shutdown_rx)?;

    let shared_state = Arc::new(AppState::new(
        publisher,
        audit_service,
        config.audit.clone(),
    ));

    let router: Router = build_router(shared_state);
    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop polling; the in-flight message is allowed to finish.
    let _ = shutdown_tx.send(true);
    if let Err(err) = consumer_handle.await {
        warn!("Kafka consumer task ended abnormally: {err}");
    }

    pg_pool.close().await;
    info!("Shutdown complete");

    Ok(())
}

fn init_tracing() {
    if tracing::subscriber::set_global_default(
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::builder()
                    .with_default_directive(Level::INFO.into())
                    .from_env_lossy()
            }))
            .finish(),
    )
    .is_err()
    {
        eprintln!("tracing subscriber already installed");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
