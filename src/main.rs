use std::sync::Arc;
use std::time::Duration;

use clanhub::config::Config;
use clanhub::services::{
    Dispatcher, FailureMeter, HookRegistry, HttpDeliverer, MembershipManager,
};
use clanhub::{build_router, db, AppState};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .json()
        .init();

    let pool = db::create_pool(&config)
        .await
        .expect("Failed to connect to PostgreSQL");
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    let hooks = HookRegistry::load(&pool)
        .await
        .expect("Failed to load webhook registry");
    let failures = FailureMeter::new();
    failures.start_ticker();

    let deliverer = Arc::new(HttpDeliverer::new(Duration::from_secs(
        config.webhooks.timeout_secs,
    )));
    let (dispatcher, workers) = Dispatcher::start(
        &config.webhooks,
        hooks.clone(),
        deliverer,
        failures.clone(),
    );
    let manager = MembershipManager::new(pool.clone(), dispatcher.clone());

    let port = config.port;
    let state = AppState {
        db: pool,
        config: Arc::new(config),
        manager,
        dispatcher: dispatcher.clone(),
        hooks,
        failures,
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .expect("Failed to bind listener");
    tracing::info!(port, "clanhub listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // Drop the remaining senders so the workers drain the queue and
    // exit; queued notifications get a best-effort flush.
    drop(dispatcher);
    workers.join().await;
    tracing::info!("clanhub stopped");
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
