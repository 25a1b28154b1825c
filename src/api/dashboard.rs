use askama::Template;
use axum::{extract::State, response::Html, routing::get, Router};
use tower_sessions::Session;

use crate::api::middleware::{auth::AuthOperator, session::AppState};
use crate::api::views::{render, Layout};
use crate::error::Result;
use crate::services::dashboard::DashboardStats;

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardPage {
    layout: Layout,
    stats: DashboardStats,
}

async fn dashboard(
    State(state): State<AppState>,
    operator: AuthOperator,
    session: Session,
) -> Result<Html<String>> {
    let stats = state.counters.stats(&operator.gateway).await?;

    render(&DashboardPage {
        layout: Layout::load(&session, &operator, "dashboard").await?,
        stats,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(dashboard))
}
