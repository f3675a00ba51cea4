//! Event Relay - HTTP ingest and Server-Sent Events fan-out
//!
//! ```text
//!  POST /ingest ──► Broker ──► subscriber queue ──► GET /events (SSE)
//!                        └───► subscriber queue ──► GET /events (SSE)
//! ```

pub mod broker;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
};

use crate::handlers;

pub use broker::{Broker, DispatchMode, Subscription};

/// Shared relay state
#[derive(Debug, Clone)]
pub struct AppState {
    pub broker: Arc<Broker>,
}

impl AppState {
    pub fn new(broker: Arc<Broker>) -> Self {
        Self { broker }
    }
}

/// Create the relay router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::check))
        .route("/stats", get(handlers::stats::stats))
        .route("/ingest", post(handlers::ingest::ingest))
        .route("/events", get(handlers::events::events))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

/// Serve the relay until `cancel` fires, then close the broker so open
/// event streams finish and the server can drain.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let broker = Arc::clone(&state.broker);
    let app = create_router(state);

    tracing::info!("Relay listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            broker.close();
        })
        .await
}
