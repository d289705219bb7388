use anyhow::Result;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use exam_prep_progress::{
    api::{create_router, AppState},
    config::{Config, LoggingConfig},
    log_system_event,
    store::{MemoryProgressStore, ProgressGateway, ProgressStore, SqliteProgressStore},
    ProgressTracker,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    let _guard = setup_logging(&config.logging)?;
    config.validate()?;

    log_system_event!(startup, component = "server", "Starting exam prep progress server");

    let store: Arc<dyn ProgressStore> =
        match SqliteProgressStore::new(&config.storage.database_url).await {
            Ok(store) => {
                info!(database_url = %config.storage.database_url, "Progress store opened");
                Arc::new(store)
            }
            Err(e) => {
                warn!(
                    database_url = %config.storage.database_url,
                    error = %e,
                    "Progress store unavailable, progress will not survive a restart"
                );
                Arc::new(MemoryProgressStore::new())
            }
        };

    let gateway = ProgressGateway::new(store, config.storage.storage_key.clone());
    let tracker = ProgressTracker::load(gateway).await;
    info!(
        flashcards_studied = tracker.progress().total_flashcards_studied,
        questions_answered = tracker.progress().total_questions_answered,
        study_streak = tracker.progress().study_streak,
        "Progress loaded"
    );

    let app = create_router(AppState::new(tracker))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let addr = config.server.address();
    info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn setup_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    use std::fs;
    use tracing_subscriber::fmt;

    let env_filter = EnvFilter::try_new(&config.level)
        .unwrap_or_else(|_| EnvFilter::new("info,exam_prep_progress=debug"));

    let console_layer = config.console_enabled.then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(true)
    });

    let mut guard = None;
    let file_layer = if config.file_enabled {
        fs::create_dir_all(&config.log_directory).unwrap_or_else(|e| {
            eprintln!("Warning: Could not create logs directory: {}", e);
        });

        // Daily rotation, no ANSI colors in files
        let file_appender =
            tracing_appender::rolling::daily(&config.log_directory, "exam-prep-progress.log");
        let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(file_guard);

        Some(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(non_blocking_file),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(
        log_directory = %config.log_directory,
        file_enabled = config.file_enabled,
        console_enabled = config.console_enabled,
        "Logging initialized"
    );

    Ok(guard)
}
