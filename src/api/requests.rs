use askama::Template;
use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::middleware::{
    auth::AuthOperator,
    session::{flash_error, flash_success, load_submitted, store_submitted, AppState},
};
use crate::api::views::{encode_segment, render, CardRow, Layout, Pager, RequestRow};
use crate::error::{AppError, Result};
use crate::models::page::PageWindow;
use crate::services::gateway::GatewayError;
use crate::services::ledger::{self, LedgerTab};
use crate::services::workflow::{self, action_for, LifecycleAction, WorkflowError};

// Workflow initiator

/// Cards with their offerable lifecycle action, also served alone to the
/// search box script
#[derive(Debug, Clone)]
pub struct EligibleTable {
    pub rows: Vec<CardRow>,
    pub pager: Pager,
    pub q: String,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "request_new.html")]
struct NewRequestPage {
    layout: Layout,
    table: EligibleTable,
}

#[derive(Template)]
#[template(path = "eligible_table.html")]
struct EligibleFragment {
    table: EligibleTable,
}

#[derive(Deserialize)]
struct EligibleQuery {
    #[serde(default = "first_page")]
    page: u64,
    #[serde(default)]
    q: String,
    #[serde(default)]
    partial: Option<String>,
}

fn first_page() -> u64 {
    1
}

async fn new_request_page(
    State(state): State<AppState>,
    operator: AuthOperator,
    session: Session,
    Query(query): Query<EligibleQuery>,
) -> Result<Response> {
    let size = state.config.cards_page_size;
    let q = query.q.trim().to_string();

    let listing = workflow::list_eligible_cards(
        &operator.gateway,
        query.page,
        size,
        &q,
        state.config.pending_scan_window,
    )
    .await;

    let table = match listing {
        Ok(eligible) => {
            let mut submitted = load_submitted(&session).await?;
            let ttl = chrono::Duration::seconds(state.config.submitted_ttl_secs as i64);
            let dropped = submitted.reconcile(&eligible.pending, Utc::now(), ttl);
            if dropped > 0 {
                tracing::debug!(dropped, remaining = submitted.len(), "Submitted set reconciled");
                store_submitted(&session, &submitted).await?;
            }

            let rows = eligible
                .cards
                .content
                .iter()
                .map(|card| {
                    CardRow::from_card(card)
                        .with_availability(action_for(card, &eligible.pending, &submitted))
                })
                .collect();

            EligibleTable {
                rows,
                pager: Pager::new(
                    PageWindow::new(query.page, eligible.cards.total_elements, size),
                    &[("q", q.as_str())],
                ),
                q,
                error: None,
            }
        }
        Err(e @ (GatewayError::Unauthorized | GatewayError::Cancelled)) => return Err(e.into()),
        Err(e) => {
            tracing::error!(error = %e, "Eligible card listing failed");
            EligibleTable {
                rows: Vec::new(),
                pager: Pager::new(PageWindow::new(1, 0, size), &[]),
                q,
                error: Some(format!("Failed to load data. {}", e.user_message())),
            }
        }
    };

    if query.partial.is_some() {
        return Ok(render(&EligibleFragment { table })?.into_response());
    }

    let page = NewRequestPage {
        layout: Layout::load(&session, &operator, "workflow").await?,
        table,
    };

    Ok(render(&page)?.into_response())
}

#[derive(Deserialize)]
struct SubmitForm {
    mask_id: String,
    action: LifecycleAction,
    /// `card` when lodged from the card edit page
    #[serde(default)]
    origin: Option<String>,
    #[serde(default)]
    page: Option<u64>,
    #[serde(default)]
    q: Option<String>,
}

impl SubmitForm {
    fn return_path(&self) -> String {
        if self.origin.as_deref() == Some("card") {
            return format!("/cards/{}/edit", encode_segment(&self.mask_id));
        }

        let pager = Pager::new(
            PageWindow::new(self.page.unwrap_or(1), 0, 1),
            &[("q", self.q.as_deref().unwrap_or_default())],
        );
        format!("/card-requests/new?page={}{}", pager.window.current, pager.query)
    }
}

async fn submit_request(
    State(state): State<AppState>,
    operator: AuthOperator,
    session: Session,
    Form(form): Form<SubmitForm>,
) -> Result<Redirect> {
    let back = form.return_path();

    let card = match operator.gateway.get_card(&form.mask_id).await {
        Ok(card) => card,
        Err(e @ (GatewayError::Unauthorized | GatewayError::Cancelled)) => return Err(e.into()),
        Err(e) => {
            flash_error(&session, e.user_message()).await?;
            return Ok(Redirect::to(&back));
        }
    };

    let mut submitted = load_submitted(&session).await?;

    match workflow::submit(
        &operator.gateway,
        &card,
        form.action,
        &mut submitted,
        state.config.submitted_capacity,
    )
    .await
    {
        Ok(created) => {
            store_submitted(&session, &submitted).await?;
            flash_success(
                &session,
                format!(
                    "Request #{} lodged: {} card {}.",
                    created.request_id,
                    form.action.as_str(),
                    card.masked_number()
                ),
            )
            .await?;
        }
        Err(WorkflowError::Gateway(e @ (GatewayError::Unauthorized | GatewayError::Cancelled))) => {
            return Err(e.into());
        }
        Err(e) => flash_error(&session, e.user_message()).await?,
    }

    Ok(Redirect::to(&back))
}

// Request ledger

#[derive(Debug, Clone)]
struct TabLink {
    key: &'static str,
    label: &'static str,
    count: usize,
    active: bool,
}

#[derive(Template)]
#[template(path = "requests.html")]
struct RequestsPage {
    layout: Layout,
    tabs: Vec<TabLink>,
    rows: Vec<RequestRow>,
    pending_on_page: usize,
    total_elements: u64,
    pager: Pager,
}

#[derive(Deserialize)]
struct LedgerQuery {
    #[serde(default = "first_page")]
    page: u64,
    #[serde(default)]
    tab: LedgerTab,
}

async fn list_requests(
    State(state): State<AppState>,
    operator: AuthOperator,
    session: Session,
    Query(query): Query<LedgerQuery>,
) -> Result<Html<String>> {
    let size = state.config.requests_page_size;
    let view = ledger::load_ledger(&operator.gateway, query.page, size, query.tab).await?;

    let tabs = view
        .tabs
        .iter()
        .map(|t| TabLink {
            key: t.tab.key(),
            label: t.tab.label(),
            count: t.count,
            active: t.tab == query.tab,
        })
        .collect();

    render(&RequestsPage {
        layout: Layout::load(&session, &operator, "requests").await?,
        tabs,
        rows: view.rows.iter().map(RequestRow::from_request).collect(),
        pending_on_page: view.pending_on_page,
        total_elements: view.total_elements,
        pager: Pager::new(
            PageWindow::new(query.page, view.total_elements, size),
            &[("tab", query.tab.key())],
        ),
    })
}

#[derive(Template)]
#[template(path = "request_detail.html")]
struct RequestDetailPage {
    layout: Layout,
    request: RequestRow,
    pending: bool,
}

async fn request_detail(
    operator: AuthOperator,
    session: Session,
    Path(request_id): Path<i64>,
) -> Result<Html<String>> {
    let request = match ledger::get_request(&operator.gateway, request_id).await {
        Ok(request) => request,
        Err(GatewayError::NotFound { .. }) => {
            return Err(AppError::NotFound(format!("Request #{}", request_id)));
        }
        Err(e) => return Err(e.into()),
    };

    render(&RequestDetailPage {
        layout: Layout::load(&session, &operator, "requests").await?,
        pending: request.is_pending(),
        request: RequestRow::from_request(&request),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/card-requests", get(list_requests).post(submit_request))
        .route("/card-requests/new", get(new_request_page))
        .route("/card-requests/:request_id", get(request_detail))
}
