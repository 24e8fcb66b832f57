use chrono::Utc;
use library_circulation::{
    adapters::{
        memory::{MemoryBlobStore, MemoryStore},
        postgres::PostgresStore,
    },
    api::{AppState, create_router},
    application::{ServiceDependencies, overdue},
    config::AppConfig,
    ports::LibraryStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "library_circulation=debug,tower_http=debug,axum=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    // Initialize store
    let store: Arc<dyn LibraryStore> = match &config.database_url {
        Some(database_url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(database_url)
                .await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!(
                max_connections = config.database_max_connections,
                "connected to PostgreSQL"
            );
            Arc::new(PostgresStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    // Create service dependencies
    let service_deps = ServiceDependencies::new(store).with_retry(config.retry);

    if !config.overdue_sweep_interval.is_zero() {
        tokio::spawn(run_overdue_sweeps(
            service_deps.clone(),
            config.overdue_sweep_interval,
        ));
    }

    // Create application state
    let app_state = Arc::new(AppState {
        service_deps,
        blobs: Arc::new(MemoryBlobStore::new()),
    });

    // Create router
    let app = create_router(app_state);

    // Server configuration
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    // Start server
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// 定期的に延滞検出を実行する
async fn run_overdue_sweeps(deps: ServiceDependencies, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(err) = overdue::sweep_overdue(&deps, Utc::now()).await {
            tracing::error!(error = %err, "scheduled overdue sweep failed");
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
