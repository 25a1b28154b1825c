//! Shared page furniture: layout data, display formatting and rendering.

use askama::Template;
use axum::response::Html;
use rust_decimal::{Decimal, RoundingStrategy};
use tower_sessions::Session;

use crate::api::middleware::auth::AuthOperator;
use crate::api::middleware::session::{take_flash, Flash};
use crate::error::AppError;
use crate::models::{page::PageWindow, Card, LifecycleRequest};
use crate::services::workflow::{ActionAvailability, LifecycleAction};

pub const CURRENCY: &str = "LKR";

/// Whole currency units with thousands separators, e.g. `LKR 10,000`
pub fn format_currency(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let digits = rounded.abs().trunc().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("{} -{}", CURRENCY, grouped)
    } else {
        format!("{} {}", CURRENCY, grouped)
    }
}

/// Renders a template into an HTML response body
pub fn render<T: Template>(template: &T) -> Result<Html<String>, AppError> {
    Ok(Html(template.render()?))
}

/// Data every signed-in page shows around its content
#[derive(Debug, Clone)]
pub struct Layout {
    pub username: String,
    pub role: &'static str,
    pub active: &'static str,
    pub flash: Option<Flash>,
}

impl Layout {
    pub async fn load(
        session: &Session,
        operator: &AuthOperator,
        active: &'static str,
    ) -> Result<Self, AppError> {
        Ok(Self {
            username: operator.username.clone(),
            role: operator.role.as_str(),
            active,
            flash: take_flash(session).await?,
        })
    }
}

/// Percent-encodes one URL path segment
pub fn encode_segment(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Previous/next links for a paged table
#[derive(Debug, Clone)]
pub struct Pager {
    pub window: PageWindow,
    /// Query string carried on every page link, without `page`
    pub query: String,
}

impl Pager {
    pub fn new(window: PageWindow, params: &[(&str, &str)]) -> Self {
        let encoded = encode_query(params);
        let query = if encoded.is_empty() {
            encoded
        } else {
            format!("&{}", encoded)
        };
        Self { window, query }
    }
}

/// `k=v&k=v` with empty values left out
pub fn encode_query(params: &[(&str, &str)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params.iter().filter(|(_, v)| !v.is_empty()) {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

/// A card as shown in the directory and workflow tables
#[derive(Debug, Clone)]
pub struct CardRow {
    pub mask_id: String,
    pub masked_number: String,
    pub status_code: &'static str,
    pub status_label: &'static str,
    pub credit_limit: String,
    pub cash_limit: String,
    pub available_credit: String,
    pub available_cash: String,
    pub expiry: String,
    pub last_update: String,
    /// `activate` / `deactivate` when a request may be lodged
    pub action: Option<&'static str>,
    pub action_label: &'static str,
    pub action_note: &'static str,
}

impl CardRow {
    pub fn from_card(card: &Card) -> Self {
        Self {
            mask_id: card.mask_id.clone(),
            masked_number: card.masked_number(),
            status_code: card.status_code.code(),
            status_label: card.status_code.label(),
            credit_limit: format_currency(card.credit_limit),
            cash_limit: format_currency(card.cash_limit),
            available_credit: format_currency(card.available_credit_limit),
            available_cash: format_currency(card.available_cash_limit),
            expiry: card.expiry_label(),
            last_update: card
                .last_update_time
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default(),
            action: None,
            action_label: "",
            action_note: "",
        }
    }

    pub fn with_availability(mut self, availability: ActionAvailability) -> Self {
        match availability {
            ActionAvailability::Offer(action) => {
                self.action = Some(action.as_str());
                self.action_label = match action {
                    LifecycleAction::Activate => "Request Activation",
                    LifecycleAction::Deactivate => "Request Closure",
                };
            }
            ActionAvailability::Lodged => self.action_note = "Pending approval",
            ActionAvailability::OutstandingBalance => self.action_note = "Outstanding balance",
            ActionAvailability::Terminal => self.action_note = "No action available",
        }
        self
    }
}

/// A lifecycle request as shown in the ledger and approval tables
#[derive(Debug, Clone)]
pub struct RequestRow {
    pub request_id: i64,
    pub card_ref: String,
    pub card_number: String,
    pub reason_code: &'static str,
    pub reason_label: &'static str,
    pub status_code: &'static str,
    pub status_label: &'static str,
    pub create_time: String,
    pub request_user: String,
    pub approve_user: String,
    pub busy: bool,
}

impl RequestRow {
    pub fn from_request(request: &LifecycleRequest) -> Self {
        Self {
            request_id: request.request_id,
            card_ref: request.card_ref().to_string(),
            card_number: request
                .card_number
                .as_deref()
                .map(crate::models::card::mask_card_number)
                .unwrap_or_default(),
            reason_code: request.request_reason_code.code(),
            reason_label: request.request_reason_code.label(),
            status_code: request.status_code.code(),
            status_label: request.status_code.label(),
            create_time: request.create_time.clone().unwrap_or_default(),
            request_user: request.request_user.clone().unwrap_or_default(),
            approve_user: request.approve_user.clone().unwrap_or_default(),
            busy: false,
        }
    }
}
