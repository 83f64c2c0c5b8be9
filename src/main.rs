use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use herald::config::Settings;
use herald::notification::{DeliveryDispatcher, ServiceType};
use herald::postgres::PostgresPool;
use herald::queue::create_job_source;
use herald::redis::{BackoffConfig, RedisPool};
use herald::server::{create_app, AppContext, AppState, ListenerHandle};
use herald::shutdown::{GracefulShutdown, ShutdownConfig};
use herald::store::create_outcome_store;
use herald::telemetry::init_telemetry;
use herald::template::FileTemplateLoader;
use herald::transport::{LiveSenderConnector, TransportRegistry};
use herald::triggers::{JobConsumer, WorkerPool};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Arc::new(Settings::new()?);

    // Initialize tracing
    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!(
        platforms = settings.platforms.len(),
        source = %settings.worker.source,
        "Configuration loaded"
    );

    // Broker
    let redis_pool = if settings.worker.source == "redis" {
        Some(Arc::new(RedisPool::new(settings.redis.clone())?))
    } else {
        None
    };
    let source = create_job_source(&settings.worker, &settings.redis, redis_pool);

    // Outcome store
    let postgres_pool = match settings.database.url {
        Some(_) => Some(PostgresPool::new(&settings.database)?),
        None => None,
    };
    let store = create_outcome_store(postgres_pool);

    let context = Arc::new(AppContext::new(store.clone(), source.clone()));
    context
        .wait_until_ready(
            settings.worker.readiness_timeout(),
            BackoffConfig::from_redis_config(&settings.redis),
        )
        .await?;

    // Delivery pipeline
    let connector = Arc::new(LiveSenderConnector::new()?);
    let platforms = Arc::new(settings.platforms.clone());
    let registry = |service_type| {
        Arc::new(TransportRegistry::new(
            service_type,
            platforms.clone(),
            connector.clone(),
            settings.worker.delivery_timeout(),
        ))
    };
    let dispatcher = Arc::new(DeliveryDispatcher::new(
        Arc::new(FileTemplateLoader::new(&settings.templates.dir)),
        registry(ServiceType::Mail),
        registry(ServiceType::Push),
        settings.worker.max_concurrent_deliveries,
    ));
    let workers = Arc::new(WorkerPool::new(settings.worker.max_concurrent_jobs));
    tracing::info!(
        templates = %settings.templates.dir,
        workers = workers.capacity(),
        "Delivery pipeline initialized"
    );

    // Observability listener
    let state = AppState::new(
        settings.clone(),
        context.clone(),
        dispatcher.clone(),
        workers.clone(),
    );
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    context
        .attach_listener(ListenerHandle::spawn(listener, create_app(state))?)
        .await;
    tracing::info!("Server listening on {}", addr);

    // Job consumer
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let consumer = JobConsumer::new(source, dispatcher, store, workers.clone())
        .with_poll_timeout(Duration::from_secs(settings.redis.poll_timeout_seconds))
        .with_backoff(BackoffConfig::from_redis_config(&settings.redis));
    let consumer_rx = shutdown_tx.subscribe();
    let consumer_handle = tokio::spawn(async move {
        consumer.run(consumer_rx).await;
    });

    shutdown_signal_handler().await;

    let shutdown = GracefulShutdown::with_config(
        context,
        workers,
        shutdown_tx,
        ShutdownConfig::from_worker_config(&settings.worker),
    );
    let result = shutdown.execute("signal").await;

    let _ = consumer_handle.await;

    if !result.success {
        tracing::warn!(
            jobs_drained = result.jobs_drained,
            release_timed_out = ?result.release_timed_out,
            "Shutdown finished with abandoned work"
        );
    }
    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
