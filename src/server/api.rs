use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method, StatusCode},
    routing::get,
    Json, Router,
};
use colored::*;
use serde_json::{json, Value};
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::config::Config;
use crate::memories::handlers;
use crate::relay::{self, RelayHandle};
use crate::storage::{self, Database, MediaHost, LOCAL_MEDIA_ROUTE};

/// Multipart framing and text fields on top of the file itself.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<Database>,
    pub media: Arc<dyn MediaHost>,
    pub relay: RelayHandle,
}

impl AppState {
    /// Open storage and start the relay task. Must run inside a tokio runtime.
    pub fn new(config: Config) -> Result<Self> {
        let db = storage::open_database(&config.storage)?;
        let media = storage::media_host(&config.media, &config.storage)?;
        let (relay, _task) = relay::spawn();

        Ok(Self {
            config: Arc::new(config),
            db,
            media,
            relay,
        })
    }
}

pub fn router(state: AppState) -> Result<Router> {
    let config = state.config.clone();

    let memories = Router::new()
        .route(
            "/",
            get(handlers::list_memories).post(handlers::create_memory),
        )
        .route(
            "/{id}",
            get(handlers::get_memory)
                .put(handlers::update_memory)
                .delete(handlers::delete_memory),
        )
        .layer(DefaultBodyLimit::max(
            config.media.max_upload_bytes + FORM_OVERHEAD_BYTES,
        ));

    let mut app = Router::new()
        .route("/api/health", get(health))
        .nest("/api/memories", memories)
        .route("/ws", get(super::ws::ws_handler));

    if config.media.cloudinary.is_none() {
        app = app.nest_service(LOCAL_MEDIA_ROUTE, ServeDir::new(config.storage.media_dir()));
    }

    if config.server.production {
        let dist = &config.server.static_dir;
        app = app.fallback_service(
            ServeDir::new(dist).fallback(ServeFile::new(dist.join("index.html"))),
        );
    } else {
        app = app.fallback(not_found);
    }

    Ok(app
        .layer(cors_layer(&config.server.frontend_url)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

fn cors_layer(frontend_url: &str) -> Result<CorsLayer> {
    let origin: HeaderValue = frontend_url
        .parse()
        .with_context(|| format!("invalid FRONTEND_URL: {frontend_url}"))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let peers = state.relay.peers().await.len();
    Json(json!({
        "status": "Server is running",
        "timestamp": chrono::Utc::now(),
        "peers": peers,
    }))
}

async fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Route not found" })),
    )
}

pub async fn serve(config: Config) -> Result<()> {
    let addr = config.server.bind_addr();
    let production = config.server.production;
    let state = AppState::new(config)?;
    let app = router(state)?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    println!(
        "{} Server running at {}",
        "✓".green(),
        format!("http://{}", addr).bright_blue()
    );
    println!("  API:       {}", format!("http://{}/api", addr).bright_white());
    println!("  Signaling: {}", format!("ws://{}/ws", addr).bright_white());
    tracing::info!(%addr, production, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
