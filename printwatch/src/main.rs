use std::sync::Arc;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use printwatch::api::{ApiServer, AppState};
use printwatch::config::AppConfig;
use printwatch::database::{self, repositories::*};
use printwatch::jobs::{JobLifecycle, JobTracker};
use printwatch::logging;
use printwatch::monitor::{MqttTelemetrySource, PrinterMonitor};
use printwatch::notification::NotificationDispatcher;
use printwatch::utils::http_client;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env_or_default();

    // The guard flushes the file writer on drop.
    let (logging_config, _log_guard) = logging::init_logging(&config.log_dir)?;
    config.log_ignored();
    http_client::install_rustls_provider();

    let pool = database::init_pool(&config.database_url).await?;
    database::run_migrations(&pool).await?;

    let registry: Arc<dyn PrinterRegistry> = Arc::new(SqlxPrinterRegistry::new(pool.clone()));
    let job_history: Arc<dyn JobHistoryRepository> =
        Arc::new(SqlxJobHistoryRepository::new(pool.clone()));
    let notifications = Arc::new(SqlxNotificationRepository::new(pool.clone()));

    let dispatcher = Arc::new(NotificationDispatcher::new(
        notifications.clone(),
        notifications.clone(),
    ));
    let lifecycle = Arc::new(JobLifecycle::new(
        JobTracker::new(config.load_classification_rules()?),
        registry.clone(),
        job_history.clone(),
        dispatcher,
    ));
    let source = Arc::new(MqttTelemetrySource::new(config.load_ca_cert()?));

    let shutdown = CancellationToken::new();
    let monitor = Arc::new(PrinterMonitor::new(
        config.monitor.clone(),
        registry,
        source,
        lifecycle,
        &Handle::current(),
        shutdown.child_token(),
    ));
    monitor.start_all().await?;

    logging_config.start_retention_cleanup(shutdown.child_token());

    let state = AppState::new(monitor.clone(), job_history, notifications)
        .with_logging_config(logging_config)
        .with_debug_endpoints(config.enable_debug_endpoints);
    let server = ApiServer::new(config.api.clone(), state, shutdown.child_token());
    let mut server_task = tokio::spawn(async move { server.run().await });

    let server_running = tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
            true
        }
        result = &mut server_task => {
            log_server_exit(result);
            false
        }
    };

    shutdown.cancel();
    if server_running {
        // Let in-flight requests finish before the pool goes away.
        let drained = tokio::time::timeout(config.monitor.shutdown_timeout, &mut server_task).await;
        match drained {
            Ok(result) => log_server_exit(result),
            Err(_) => {
                tracing::warn!("API server did not drain in time, aborting");
                server_task.abort();
            }
        }
    }
    monitor.shutdown().await;
    pool.close().await;
    tracing::info!("printwatch stopped");

    Ok(())
}

fn log_server_exit(result: Result<printwatch::Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => tracing::info!("API server stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "API server failed"),
        Err(e) => tracing::error!(error = %e, "API server task panicked"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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
}
