use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use kindred_api::storage::MediaStore;
use kindred_api::{AppState, AppStateInner};
use kindred_classifier::{Classifier, DEFAULT_GEMINI_URL, GeminiModel};
use kindred_db::Database;
use kindred_engine::RateLimiter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kindred=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let gemini_api_key = std::env::var("GEMINI_API_KEY").unwrap_or_default();
    if gemini_api_key.is_empty() {
        eprintln!("FATAL: GEMINI_API_KEY is not set.");
        eprintln!("       Classification cannot run without it. Set it in your .env and restart.");
        std::process::exit(1);
    }

    let host = std::env::var("KINDRED_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("KINDRED_PORT")
        .unwrap_or_else(|_| "5000".into())
        .parse()?;
    let db_path: PathBuf = std::env::var("KINDRED_DB_PATH")
        .unwrap_or_else(|_| "kindred.db".into())
        .into();
    let upload_dir: PathBuf = std::env::var("KINDRED_UPLOAD_DIR")
        .unwrap_or_else(|_| "./uploads".into())
        .into();
    let gemini_url =
        std::env::var("KINDRED_GEMINI_URL").unwrap_or_else(|_| DEFAULT_GEMINI_URL.into());

    // Init database, media storage, classifier
    let db = Arc::new(Database::open(&db_path)?);
    let media = MediaStore::new(upload_dir).await?;
    let model = GeminiModel::new(&gemini_url, &gemini_api_key)?;
    let classifier = Classifier::new(Box::new(model));

    let state: AppState = Arc::new(AppStateInner {
        db,
        media,
        classifier,
        rate_limiter: RateLimiter::default(),
    });

    let app = kindred_api::router(state)
        .layer(DefaultBodyLimit::max(25 * 1024 * 1024)) // 25 MB uploads
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Kindred server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
