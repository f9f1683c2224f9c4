//! The panel-link bridge: terminates ITv2/TLink panel connections on one
//! port and serves a WebSocket-based UI facade on another, backed by the
//! session engine in `itv2-engine`.

pub mod config;
pub mod panel_link;
pub mod protocol;
pub mod state;
pub mod ws;

pub use state::AppState;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/v1/ui", get(ws::ws_ui_handler))
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

mod health {
    use axum::response::IntoResponse;

    pub async fn healthz() -> impl IntoResponse {
        "ok"
    }

    pub async fn readyz() -> impl IntoResponse {
        "ok"
    }
}
