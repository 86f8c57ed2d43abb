//! HTTP server setup and request routing.
//!
//! Wires the control-plane routes with the middleware stack (request ids,
//! request tracing, timeout enforcement) and serves them with graceful
//! shutdown on ctrl-c or SIGTERM.

use std::{net::SocketAddr, time::Duration};

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

use crate::{handlers, AppState};

/// Deadline applied to every control-plane request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates the axum router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/v1/health", get(handlers::health))
        .route("/v1/scheduler/status", get(handlers::scheduler_status))
        .route("/v1/scheduler/start", post(handlers::scheduler_start))
        .route("/v1/scheduler/stop", post(handlers::scheduler_stop))
        .route("/v1/messages/sent", get(handlers::list_sent))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(inject_request_id))
        .with_state(state)
}

/// Adds an `X-Request-Id` header to every response for log correlation.
async fn inject_request_id(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();

    let mut req = req;
    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;

    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert("X-Request-Id", header_value);
    }

    response
}

/// Binds `addr` and serves the control plane until a shutdown signal.
///
/// # Errors
///
/// Returns `std::io::Error` when the address cannot be bound or the
/// listener fails.
pub async fn start_server(state: AppState, addr: SocketAddr) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "control plane listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("control plane stopped");
    Ok(())
}

/// Completes on ctrl-c (development) or SIGTERM (orchestrators).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(signal_error) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %signal_error, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(signal_error) => {
                tracing::error!(error = %signal_error, "failed to install SIGTERM handler");
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
