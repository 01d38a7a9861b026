use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::command::Actuator;
use crate::engine::EngineHandle;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
    engine: EngineHandle,
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
        }),
    )
}

/// Handler for GET /v1/panel
#[tracing::instrument(skip(state))]
async fn panel(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.engine.panel()))
}

/// Handler for GET /v1/panel/{id}
#[tracing::instrument(skip(state))]
async fn element(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.engine.panel().element(&id) {
        Some(element) => (StatusCode::OK, Json(element.clone())).into_response(),
        None => error(StatusCode::NOT_FOUND, format!("no element '{}'", id)),
    }
}

/// Handler for POST /v1/actuators/{actuator}/toggle
#[tracing::instrument(skip(state))]
async fn toggle(State(state): State<Arc<AppState>>, Path(actuator): Path<String>) -> Response {
    let Ok(actuator) = Actuator::from_str(&actuator) else {
        return error(StatusCode::NOT_FOUND, format!("no actuator '{}'", actuator));
    };

    match state.engine.toggle(actuator).await {
        Ok(toggle) => (StatusCode::OK, Json(toggle)).into_response(),
        Err(e) => error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

/// Create the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/panel", get(panel))
        .route("/v1/panel/:id", get(element))
        .route("/v1/actuators/:actuator/toggle", post(toggle))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// Serves the panel and the actuator controls until `shutdown_rx` fires.
///
/// # Arguments
/// * `listen` - The IP address to listen on (e.g., "127.0.0.1")
/// * `port` - The port to listen on (e.g., 8565)
/// * `engine` - Handle to the running engine
/// * `shutdown_rx` - A oneshot receiver that will trigger graceful shutdown
pub async fn serve(
    listen: String,
    port: u16,
    engine: EngineHandle,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let version = env!("CARGO_PKG_VERSION");

    let state = Arc::new(AppState { version, engine });
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}
