mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use rapport_api::middleware::decode_token;
use rapport_api::state::{AppState, AppStateInner};
use rapport_gateway::Hub;
use rapport_gateway::connection;

use crate::config::Config;

#[derive(Clone)]
struct GatewayState {
    hub: Hub,
    jwt_secret: String,
    queue_capacity: usize,
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rapport=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(rapport_db::Database::open(&config.db_path)?);

    // Hub
    let shutdown = CancellationToken::new();
    let (hub, hub_task) = Hub::spawn(db.clone(), shutdown.clone());

    let app_state: AppState = Arc::new(AppStateInner {
        db,
        hub: hub.clone(),
        jwt_secret: config.jwt_secret.clone(),
    });

    let gateway_state = GatewayState {
        hub,
        jwt_secret: config.jwt_secret.clone(),
        queue_capacity: config.hub_queue,
    };

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway_state);

    let cors = match &config.cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    };

    let app = rapport_api::router(app_state)
        .merge(ws_route)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    info!("Rapport server listening on {}", config.addr);
    info!("Database: {}", config.db_path.display());

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    let stop_hub = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Closing every session queue lets the socket workers wind down.
            stop_hub.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = hub_task.await {
        warn!("Hub task ended abnormally: {}", e);
    }

    Ok(())
}

/// The token travels in the query string since browsers cannot set headers
/// on a WebSocket handshake. It is checked before the upgrade.
async fn ws_upgrade(
    State(state): State<GatewayState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let user_id = match query
        .token
        .as_deref()
        .and_then(|token| decode_token(&state.jwt_secret, token))
    {
        Some(user_id) => user_id,
        None => return StatusCode::UNAUTHORIZED.into_response(),
    };

    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.hub, user_id, state.queue_capacity)
    })
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
