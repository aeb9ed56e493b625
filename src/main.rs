//! Session timer backend entrypoint wiring REST, SSE, the scheduler and the timer store.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::{net::TcpListener, sync::watch};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use session_timer_back::{
    config::{AppConfig, StoreBackend},
    dao::timer_store::MemoryTimerStore,
    routes,
    services::{scheduler, storage_supervisor},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let port = config.port;
    let app_state = AppState::new(config);

    spawn_store(app_state.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = tokio::spawn(scheduler::run(app_state.clone(), shutdown_rx));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    let _ = shutdown_tx.send(true);
    scheduler_task.await.context("joining scheduler task")?;
    Ok(())
}

/// Connect the configured timer store in the background.
fn spawn_store(state: SharedState) {
    match state.config().store_backend {
        StoreBackend::Memory => {
            info!("using in-memory timer store; timers will not survive a restart");
            tokio::spawn(async move {
                storage_supervisor::install(&state, Arc::new(MemoryTimerStore::new())).await;
            });
        }
        #[cfg(feature = "mongo-store")]
        StoreBackend::Mongo => {
            use session_timer_back::dao::{
                storage::StorageError,
                timer_store::{
                    TimerStore,
                    mongodb::{MongoTimerStore, TimerDbTarget},
                },
            };

            let config = state.config().clone();
            tokio::spawn(storage_supervisor::run(state, move || {
                let config = config.clone();
                async move {
                    let target = TimerDbTarget::from_app_config(&config).await?;
                    let store = MongoTimerStore::connect(target).await?;
                    Ok::<Arc<dyn TimerStore>, StorageError>(Arc::new(store))
                }
            }));
        }
        #[cfg(not(feature = "mongo-store"))]
        StoreBackend::Mongo => {
            tracing::error!(
                "MongoDB store requested but the `mongo-store` feature is disabled; staying in degraded mode"
            );
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
