// API module - HTTP endpoints

pub mod approvals;
pub mod auth;
pub mod cards;
pub mod dashboard;
pub mod health;
pub mod middleware;
pub mod reports;
pub mod requests;
pub mod views;

use axum::Router;
use tower_http::trace::TraceLayer;

use middleware::session::{create_session_layer, AppState};

/// The whole console: every page router behind the session and trace layers
pub fn app(state: AppState) -> Router {
    let session_layer = create_session_layer(&state.config);

    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(dashboard::router())
        .merge(cards::router())
        .merge(requests::router())
        .merge(approvals::router())
        .merge(reports::router())
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
