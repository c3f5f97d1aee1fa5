/// Server setup and initialization
///
/// Wires together storage, the task registry, the execution engine with its queue and the
/// HTTP routes. Provides the application factory used by `main` and the integration tests.

use crate::{
    analytics::AnalyticsStorage,
    api::{create_api_routes, AppState},
    auth::TokenService,
    billing::BalanceStorage,
    config::Config,
    database,
    execution::{enqueue_pending, ExecutionEngine, ExecutionQueue, ExecutionStorage, WorkerHandle},
    tasks::TaskRegistry,
    users::UserStorage,
    workflow::WorkflowStorage,
};
use anyhow::Result;
use axum::{routing::get, Router};
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Build the shared state and start the execution workers
///
/// Executions left PENDING or RUNNING by a previous process are queued again before the
/// state is returned.
pub async fn build_state(
    config: Config,
    pool: SqlitePool,
    tasks: Arc<TaskRegistry>,
) -> Result<(AppState, WorkerHandle)> {
    let workflows = WorkflowStorage::new(pool.clone());
    let executions = ExecutionStorage::new(pool.clone());
    let balances = BalanceStorage::new(pool.clone());

    tracing::info!("🚀 Initializing execution engine");
    let engine = Arc::new(ExecutionEngine::new(
        executions.clone(),
        workflows.clone(),
        balances.clone(),
        Arc::clone(&tasks),
    ));
    let (queue, workers) = ExecutionQueue::start(engine, &config.queue);

    let resumed = enqueue_pending(&executions, &queue).await?;
    if resumed > 0 {
        tracing::info!("📥 Resumed {} pending executions", resumed);
    }

    let state = AppState {
        tokens: Arc::new(TokenService::new(&config.auth)),
        config: Arc::new(config),
        users: UserStorage::new(pool.clone()),
        workflows,
        executions,
        balances,
        analytics: AnalyticsStorage::new(pool),
        tasks,
        queue,
    };

    Ok((state, workers))
}

/// Health check plus every API route
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .merge(create_api_routes())
        .with_state(state)
}

/// Create the main Axum application with the built-in task handlers
pub async fn create_app(config: Config) -> Result<(Router, WorkerHandle)> {
    let pool = database::connect(&config.database).await?;

    tracing::info!("🧩 Registering built-in task handlers");
    let tasks = Arc::new(TaskRegistry::with_builtin_handlers(reqwest::Client::new()));

    let (state, workers) = build_state(config, pool, tasks).await?;
    tracing::info!("✅ Application initialized successfully");

    Ok((create_router(state), workers))
}

/// Start the HTTP server with the given configuration
///
/// Runs until Ctrl-C, then lets running executions finish before returning.
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting UI-Butler server...");

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let (app, workers) = create_app(config).await?;

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("🛑 HTTP server stopped, draining execution workers");
    workers.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}
