use askama::Template;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::middleware::{
    auth::AuthOperator,
    session::{flash_error, flash_success, load_submitted, AppState},
};
use crate::api::views::{encode_segment, render, CardRow, Layout, Pager};
use crate::error::{AppError, Result};
use crate::models::{
    card::{CreateCardForm, UpdateCardForm},
    page::PageWindow,
    Card, CardStatus,
};
use crate::services::directory::{self, DirectoryError, FieldErrors};
use crate::services::gateway::GatewayError;
use crate::services::workflow::{action_for, PendingSet};

/// The directory table, also served on its own to the search box script
#[derive(Debug, Clone)]
pub struct CardsTable {
    pub rows: Vec<CardRow>,
    pub pager: Pager,
    pub q: String,
}

#[derive(Template)]
#[template(path = "cards.html")]
struct CardsPage {
    layout: Layout,
    table: CardsTable,
}

#[derive(Template)]
#[template(path = "cards_table.html")]
struct CardsFragment {
    table: CardsTable,
}

#[derive(Deserialize)]
struct ListQuery {
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

async fn list_cards(
    State(state): State<AppState>,
    operator: AuthOperator,
    session: Session,
    Query(query): Query<ListQuery>,
) -> Result<Response> {
    let size = state.config.cards_page_size;
    let cards = directory::find_cards(&operator.gateway, query.page, size, &query.q).await?;

    let table = CardsTable {
        rows: cards.content.iter().map(CardRow::from_card).collect(),
        pager: Pager::new(
            PageWindow::new(query.page, cards.total_elements, size),
            &[("q", query.q.trim())],
        ),
        q: query.q.trim().to_string(),
    };

    if query.partial.is_some() {
        return Ok(render(&CardsFragment { table })?.into_response());
    }

    let page = CardsPage {
        layout: Layout::load(&session, &operator, "cards").await?,
        table,
    };

    Ok(render(&page)?.into_response())
}

/// Raw form values, kept as typed so an invalid form can be shown again
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardInput {
    #[serde(default)]
    pub card_number: String,
    #[serde(default)]
    pub expiry_date: String,
    #[serde(default)]
    pub credit_limit: String,
    #[serde(default)]
    pub cash_limit: String,
}

impl CardInput {
    fn from_card(card: &Card) -> Self {
        let form = UpdateCardForm::from_card(card);
        Self {
            card_number: card.masked_number(),
            expiry_date: form.expiry_date,
            credit_limit: form.credit_limit.normalize().to_string(),
            cash_limit: form.cash_limit.normalize().to_string(),
        }
    }

    fn create_form(&self) -> CreateCardForm {
        CreateCardForm {
            card_number: self.card_number.clone(),
            expiry_date: self.expiry_date.clone(),
            credit_limit: parse_amount(&self.credit_limit),
            cash_limit: parse_amount(&self.cash_limit),
        }
    }

    fn update_form(&self) -> UpdateCardForm {
        UpdateCardForm {
            expiry_date: self.expiry_date.clone(),
            credit_limit: parse_amount(&self.credit_limit),
            cash_limit: parse_amount(&self.cash_limit),
        }
    }
}

/// Unparseable amounts read as zero and fail the positive-limit check
fn parse_amount(raw: &str) -> Decimal {
    raw.trim().replace(',', "").parse().unwrap_or(Decimal::ZERO)
}

#[derive(Debug, Clone)]
struct StatusOption {
    code: &'static str,
    label: &'static str,
    selected: bool,
}

#[derive(Template)]
#[template(path = "card_form.html")]
struct CardFormPage {
    layout: Layout,
    /// Present when editing an existing card
    card: Option<CardRow>,
    values: CardInput,
    errors: FieldErrors,
    error: Option<String>,
    statuses: Vec<StatusOption>,
}

impl CardFormPage {
    fn action(&self) -> String {
        match &self.card {
            Some(card) => format!("/cards/{}", encode_segment(&card.mask_id)),
            None => "/cards".to_string(),
        }
    }
}

fn status_options(current: CardStatus) -> Vec<StatusOption> {
    [CardStatus::Inactive, CardStatus::Active, CardStatus::Deactivated]
        .iter()
        .map(|s| StatusOption {
            code: s.code(),
            label: s.label(),
            selected: *s == current,
        })
        .collect()
}

async fn new_card_page(operator: AuthOperator, session: Session) -> Result<Html<String>> {
    render(&CardFormPage {
        layout: Layout::load(&session, &operator, "cards").await?,
        card: None,
        values: CardInput::default(),
        errors: FieldErrors::default(),
        error: None,
        statuses: Vec::new(),
    })
}

async fn create_card(
    operator: AuthOperator,
    session: Session,
    Form(input): Form<CardInput>,
) -> Result<Response> {
    match directory::create_card(&operator.gateway, &input.create_form()).await {
        Ok(card) => {
            flash_success(&session, format!("Card {} created.", card.masked_number())).await?;
            Ok(Redirect::to("/cards").into_response())
        }
        Err(err) => {
            let (errors, error) = form_failure(err)?;
            let page = CardFormPage {
                layout: Layout::load(&session, &operator, "cards").await?,
                card: None,
                values: input,
                errors,
                error,
                statuses: Vec::new(),
            };
            Ok((StatusCode::UNPROCESSABLE_ENTITY, render(&page)?).into_response())
        }
    }
}

/// Splits a failed save into inline field errors or a page-level message
fn form_failure(err: DirectoryError) -> Result<(FieldErrors, Option<String>)> {
    match err {
        DirectoryError::Invalid(fields) => Ok((fields, None)),
        DirectoryError::Gateway(e @ (GatewayError::Unauthorized | GatewayError::Cancelled)) => {
            Err(AppError::Gateway(e))
        }
        DirectoryError::Gateway(e) => Ok((FieldErrors::default(), Some(e.user_message()))),
    }
}

/// Card row with the lifecycle action the edit page may offer
async fn card_with_action(
    state: &AppState,
    operator: &AuthOperator,
    session: &Session,
    card: &Card,
) -> Result<CardRow> {
    let row = CardRow::from_card(card);

    match operator
        .gateway
        .list_requests(0, state.config.pending_scan_window)
        .await
    {
        Ok(requests) => {
            let pending = PendingSet::from_requests(&requests.content);
            let submitted = load_submitted(session).await?;
            Ok(row.with_availability(action_for(card, &pending, &submitted)))
        }
        Err(e @ (GatewayError::Unauthorized | GatewayError::Cancelled)) => Err(e.into()),
        Err(e) => {
            tracing::warn!(mask_id = %card.mask_id, error = %e, "Pending requests unavailable");
            let mut row = row;
            row.action_note = "Request status unavailable";
            Ok(row)
        }
    }
}

async fn edit_card_page(
    State(state): State<AppState>,
    operator: AuthOperator,
    session: Session,
    Path(mask_id): Path<String>,
) -> Result<Html<String>> {
    let card = directory::get_card(&operator.gateway, &mask_id).await?;
    let row = card_with_action(&state, &operator, &session, &card).await?;

    render(&CardFormPage {
        layout: Layout::load(&session, &operator, "cards").await?,
        values: CardInput::from_card(&card),
        statuses: status_options(card.status_code),
        card: Some(row),
        errors: FieldErrors::default(),
        error: None,
    })
}

async fn update_card(
    State(state): State<AppState>,
    operator: AuthOperator,
    session: Session,
    Path(mask_id): Path<String>,
    Form(input): Form<CardInput>,
) -> Result<Response> {
    match directory::update_card(&operator.gateway, &mask_id, &input.update_form()).await {
        Ok(card) => {
            flash_success(&session, format!("Card {} updated.", card.masked_number())).await?;
            Ok(Redirect::to("/cards").into_response())
        }
        Err(err) => {
            let (errors, error) = form_failure(err)?;
            let card = directory::get_card(&operator.gateway, &mask_id).await?;
            let row = card_with_action(&state, &operator, &session, &card).await?;
            let values = CardInput {
                card_number: card.masked_number(),
                ..input
            };
            let page = CardFormPage {
                layout: Layout::load(&session, &operator, "cards").await?,
                statuses: status_options(card.status_code),
                card: Some(row),
                values,
                errors,
                error,
            };
            Ok((StatusCode::UNPROCESSABLE_ENTITY, render(&page)?).into_response())
        }
    }
}

#[derive(Deserialize)]
struct StatusForm {
    status: String,
}

async fn update_card_status(
    operator: AuthOperator,
    session: Session,
    Path(mask_id): Path<String>,
    Form(form): Form<StatusForm>,
) -> Result<Redirect> {
    let status = CardStatus::from_code(&form.status)
        .ok_or_else(|| AppError::Validation(format!("Unknown card status: {}", form.status)))?;

    match directory::update_card_status(&operator.gateway, &mask_id, status).await {
        Ok(card) => {
            flash_success(
                &session,
                format!("Card status changed to {}.", card.status_code.label()),
            )
            .await?
        }
        Err(e @ (GatewayError::Unauthorized | GatewayError::Cancelled)) => return Err(e.into()),
        Err(e) => flash_error(&session, e.user_message()).await?,
    }

    Ok(Redirect::to(&format!("/cards/{}/edit", encode_segment(&mask_id))))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cards", get(list_cards).post(create_card))
        .route("/cards/new", get(new_card_page))
        .route("/cards/:mask_id", post(update_card))
        .route("/cards/:mask_id/edit", get(edit_card_page))
        .route("/cards/:mask_id/status", post(update_card_status))
}
