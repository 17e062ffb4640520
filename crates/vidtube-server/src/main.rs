mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{
    HeaderValue, Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use vidtube_api::{AppStateInner, TokenService};
use vidtube_db::Database;
use vidtube_media::{CloudinaryUploader, DiskMediaStore, MediaUploader};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vidtube=debug,vidtube_api=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Fix your environment or .env file and restart.");
            std::process::exit(1);
        }
    };
    vidtube_api::expose_error_details(!config.production);

    let db = Database::open(&config.db_path)?;
    info!("Database ready at {}", config.db_path.display());

    // Local media is served by this process; Cloudinary serves its own.
    let (uploader, media_dir): (Arc<dyn MediaUploader>, Option<PathBuf>) = match &config.cloudinary {
        Some(c) => {
            info!("Uploading media to Cloudinary cloud {}", c.cloud_name);
            let uploader: Arc<dyn MediaUploader> = Arc::new(CloudinaryUploader::new(
                c.cloud_name.clone(),
                c.api_key.clone(),
                c.api_secret.clone(),
            ));
            (uploader, None)
        }
        None => {
            let store = DiskMediaStore::new(config.media_dir.clone(), config.public_url.clone()).await?;
            let dir = store.dir().to_path_buf();
            let uploader: Arc<dyn MediaUploader> = Arc::new(store);
            (uploader, Some(dir))
        }
    };

    tokio::fs::create_dir_all(&config.temp_dir).await?;

    let state = Arc::new(AppStateInner {
        db,
        uploader,
        tokens: TokenService::new(
            config.access_secret.clone(),
            config.refresh_secret.clone(),
            config.access_ttl,
            config.refresh_ttl,
        ),
        temp_dir: config.temp_dir.clone(),
        secure_cookies: config.production,
        default_page_size: config.default_page_size,
    });

    // Cookies only cross origins with an explicit origin and credentials.
    let cors = match &config.cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([AUTHORIZATION, CONTENT_TYPE])
            .allow_credentials(true),
        None => CorsLayer::permissive(),
    };

    let mut app = vidtube_api::router(state);
    if let Some(dir) = media_dir {
        app = app.nest_service("/media", ServeDir::new(dir));
    }
    let app = app
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(
        "VidTube listening on {} ({})",
        addr,
        if config.production { "production" } else { "development" }
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
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
