use axum::{
    extract::{RawQuery, State, WebSocketUpgrade},
    http::{HeaderValue, Method},
    response::{Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::relay::Relay;
use crate::{RelayError, RelayResult};

pub mod handler;

pub use handler::WebSocketHandler;

/// Axum state wrapper for the relay
#[derive(Clone)]
pub struct RelayState {
    relay: Arc<Relay>,
}

impl RelayState {
    /// Create a new relay state
    pub fn new(relay: Arc<Relay>) -> Self {
        Self { relay }
    }

    /// Get the relay
    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }
}

/// Static liveness response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

/// Create a router with the relay WebSocket endpoint at `/ws` and health checks
/// at `/` and `/health`
pub fn router_with_relay(relay: Arc<Relay>) -> Router {
    router_with_relay_state(RelayState::new(relay))
}

/// Create a router from an existing RelayState
pub fn router_with_relay_state(relay_state: RelayState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/ws", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(relay_state)
}

/// CORS policy for the configured origins
pub fn cors_layer(config: &Config) -> CorsLayer {
    match config.allowed_origins() {
        None => CorsLayer::permissive(),
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!("Ignoring invalid CORS origin '{}'", origin);
                        None
                    }
                })
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods([Method::GET])
                .allow_headers(Any)
        }
    }
}

/// Run the relay server until it fails
pub async fn run_server(config: Config) -> RelayResult<()> {
    let relay = Arc::new(Relay::with_default_room(config.default_room.clone()));
    let app = router_with_relay(relay).layer(cors_layer(&config));

    let addr = config.server_address();
    let listener = TcpListener::bind(&addr).await?;
    info!("Server running on http://{}", addr);
    info!("WebSocket endpoint available at ws://{}/ws", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| RelayError::Server(e.to_string()))?;

    Ok(())
}

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Relay is running".to_string(),
    })
}

/// WebSocket handler endpoint.
///
/// The raw query is passed through untouched so a malformed query string never
/// rejects the upgrade.
async fn websocket_handler(
    ws: WebSocketUpgrade,
    RawQuery(query): RawQuery,
    State(state): State<RelayState>,
) -> Response {
    ws.on_upgrade(move |socket| WebSocketHandler::new(socket, state, query).handle())
}
