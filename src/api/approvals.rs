use askama::Template;
use axum::{
    extract::{Path, Query, State},
    response::{Html, Redirect},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::middleware::{
    auth::AuthOperator,
    session::{flash_error, flash_success, AppState},
};
use crate::api::views::{render, Layout, Pager, RequestRow};
use crate::error::Result;
use crate::models::page::PageWindow;
use crate::services::approval::{ApprovalError, RowMarker};
use crate::services::gateway::GatewayError;

#[derive(Template)]
#[template(path = "approvals.html")]
struct ApprovalsPage {
    layout: Layout,
    rows: Vec<RequestRow>,
    total_elements: u64,
    pager: Pager,
}

#[derive(Deserialize)]
struct QueueQuery {
    #[serde(default = "first_page")]
    page: u64,
}

fn first_page() -> u64 {
    1
}

async fn approval_queue(
    State(state): State<AppState>,
    operator: AuthOperator,
    session: Session,
    Query(query): Query<QueueQuery>,
) -> Result<Html<String>> {
    let size = state.config.requests_page_size;
    let queue = state
        .approvals
        .load_pending(&operator.gateway, query.page, size)
        .await?;

    let rows = queue
        .rows
        .iter()
        .map(|row| RequestRow {
            busy: row.marker == RowMarker::InFlight,
            ..RequestRow::from_request(&row.request)
        })
        .collect();

    render(&ApprovalsPage {
        layout: Layout::load(&session, &operator, "approvals").await?,
        rows,
        total_elements: queue.total_elements,
        pager: Pager::new(
            PageWindow::new(query.page, queue.total_elements, size),
            &[],
        ),
    })
}

#[derive(Deserialize)]
struct DecisionForm {
    approve: bool,
    #[serde(default)]
    page: Option<u64>,
}

/// Approves or rejects a pending request, then goes back to the queue so the
/// row shows whatever the ledger now reports
async fn process_request(
    State(state): State<AppState>,
    operator: AuthOperator,
    session: Session,
    Path(request_id): Path<i64>,
    Form(form): Form<DecisionForm>,
) -> Result<Redirect> {
    match state
        .approvals
        .decide(&operator.gateway, request_id, form.approve)
        .await
    {
        Ok(request) => {
            flash_success(
                &session,
                format!(
                    "Request #{} {}.",
                    request_id,
                    request.status_code.label().to_lowercase()
                ),
            )
            .await?;
        }
        Err(ApprovalError::Gateway(e @ (GatewayError::Unauthorized | GatewayError::Cancelled))) => {
            return Err(e.into());
        }
        Err(e) => flash_error(&session, e.user_message()).await?,
    }

    let page = form.page.unwrap_or(1).max(1);
    Ok(Redirect::to(&format!("/approvals?page={}", page)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/approvals", get(approval_queue))
        .route("/card-requests/:request_id/process", post(process_request))
}
