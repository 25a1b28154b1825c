use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::wire;

/// Operational status of a card as stored by the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardStatus {
    #[serde(rename = "IACT")]
    Inactive,
    #[serde(rename = "CACT")]
    Active,
    #[serde(rename = "DACT")]
    Deactivated,
}

impl CardStatus {
    pub fn code(&self) -> &'static str {
        match self {
            CardStatus::Inactive => "IACT",
            CardStatus::Active => "CACT",
            CardStatus::Deactivated => "DACT",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CardStatus::Inactive => "Inactive",
            CardStatus::Active => "Active",
            CardStatus::Deactivated => "Deactivated",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "IACT" => Some(CardStatus::Inactive),
            "CACT" => Some(CardStatus::Active),
            "DACT" => Some(CardStatus::Deactivated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub mask_id: String,
    pub card_number: String,
    pub status_code: CardStatus,
    pub credit_limit: Decimal,
    pub cash_limit: Decimal,
    pub available_credit_limit: Decimal,
    pub available_cash_limit: Decimal,
    #[serde(deserialize_with = "wire::deserialize_date")]
    pub expiry_date: NaiveDate,
    #[serde(default, deserialize_with = "wire::deserialize_optional_timestamp")]
    pub last_update_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub last_update_user: Option<String>,
}

impl Card {
    /// Part of the credit limit is in use. Deactivation is not offered for such cards.
    pub fn has_outstanding_balance(&self) -> bool {
        self.available_credit_limit < self.credit_limit
    }

    pub fn masked_number(&self) -> String {
        mask_card_number(&self.card_number)
    }

    pub fn last_four(&self) -> String {
        let digits: Vec<char> = self.card_number.chars().filter(|c| c.is_ascii_digit()).collect();
        digits[digits.len().saturating_sub(4)..].iter().collect()
    }

    /// `MM / YY` as printed on the card face
    pub fn expiry_label(&self) -> String {
        self.expiry_date.format("%m / %y").to_string()
    }
}

pub fn mask_card_number(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 4 {
        return raw.to_string();
    }
    format!("****-****-****-{}", &digits[digits.len() - 4..])
}

/// Card issuance form. The card number is fixed after the first sync.
#[derive(Debug, Clone, Default, Validate)]
#[validate(schema(function = "validate_cash_within_credit", skip_on_field_errors = false))]
pub struct CreateCardForm {
    #[validate(custom(function = "validate_card_number"))]
    pub card_number: String,
    #[validate(custom(function = "validate_expiry"))]
    pub expiry_date: String,
    #[validate(custom(function = "validate_positive_limit"))]
    pub credit_limit: Decimal,
    #[validate(custom(function = "validate_positive_limit"))]
    pub cash_limit: Decimal,
}

#[derive(Debug, Clone, Default, Validate)]
#[validate(schema(function = "validate_update_cash_within_credit", skip_on_field_errors = false))]
pub struct UpdateCardForm {
    #[validate(custom(function = "validate_expiry"))]
    pub expiry_date: String,
    #[validate(custom(function = "validate_positive_limit"))]
    pub credit_limit: Decimal,
    #[validate(custom(function = "validate_positive_limit"))]
    pub cash_limit: Decimal,
}

impl UpdateCardForm {
    pub fn from_card(card: &Card) -> Self {
        Self {
            expiry_date: card.expiry_date.format("%Y-%m").to_string(),
            credit_limit: card.credit_limit,
            cash_limit: card.cash_limit,
        }
    }
}

/// Body of `POST /api/cards`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCardData {
    pub card_number: String,
    pub expiry_date: String,
    pub credit_limit: Decimal,
    pub cash_limit: Decimal,
}

/// Body of `PUT /api/cards/{maskId}`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCardData {
    pub expiry_date: String,
    pub credit_limit: Decimal,
    pub cash_limit: Decimal,
}

impl From<&CreateCardForm> for CreateCardData {
    fn from(form: &CreateCardForm) -> Self {
        Self {
            card_number: digits_only(&form.card_number),
            expiry_date: expiry_payload(&form.expiry_date),
            credit_limit: form.credit_limit,
            cash_limit: form.cash_limit,
        }
    }
}

impl From<&UpdateCardForm> for UpdateCardData {
    fn from(form: &UpdateCardForm) -> Self {
        Self {
            expiry_date: expiry_payload(&form.expiry_date),
            credit_limit: form.credit_limit,
            cash_limit: form.cash_limit,
        }
    }
}

/// Body of `PUT /api/cards/{maskId}/status`
#[derive(Debug, Clone, Serialize)]
pub struct CardStatusUpdate {
    pub status: CardStatus,
}

fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// The backend wants `YYYY-MM-DD`; a bare month becomes the first of that month.
pub fn expiry_payload(raw: &str) -> String {
    match parse_expiry(raw) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => raw.trim().to_string(),
    }
}

fn fixed_digits<T: std::str::FromStr>(part: &str, width: usize) -> Option<T> {
    if part.len() != width || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

/// Parses `YYYY-MM` or `YYYY-MM-DD`; a bare month is the first of that month
fn parse_expiry(raw: &str) -> Option<NaiveDate> {
    let mut parts = raw.trim().split('-');
    let year: i32 = fixed_digits(parts.next()?, 4)?;
    let month: u32 = fixed_digits(parts.next()?, 2)?;
    let day: u32 = match parts.next() {
        Some(day) => fixed_digits(day, 2)?,
        None => 1,
    };
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

fn validation_error(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(message.into())
}

fn validate_card_number(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(validation_error("required", "Card number is required."));
    }
    if value.chars().any(|c| !c.is_ascii_digit() && !c.is_whitespace() && c != '-') {
        return Err(validation_error("digits", "Card number may only contain digits."));
    }
    if digits_only(value).len() != 16 {
        return Err(validation_error("length", "Card number must be 16 digits."));
    }
    Ok(())
}

fn validate_expiry(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(validation_error("required", "Expiry date is required."));
    }
    let selected = parse_expiry(value)
        .ok_or_else(|| validation_error("format", "Expiry date must be YYYY-MM."))?;

    let today = Utc::now().date_naive();
    if (selected.year(), selected.month()) < (today.year(), today.month()) {
        return Err(validation_error("past", "Expiry date cannot be in the past."));
    }
    Ok(())
}

fn validate_positive_limit(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(validation_error("positive", "Limit must be greater than 0."));
    }
    Ok(())
}

fn cash_within_credit(cash: Decimal, credit: Decimal) -> Result<(), ValidationError> {
    if cash > credit {
        return Err(validation_error(
            "cash_exceeds_credit",
            "Cash limit cannot exceed credit limit.",
        ));
    }
    Ok(())
}

fn validate_cash_within_credit(form: &CreateCardForm) -> Result<(), ValidationError> {
    cash_within_credit(form.cash_limit, form.credit_limit)
}

fn validate_update_cash_within_credit(form: &UpdateCardForm) -> Result<(), ValidationError> {
    cash_within_credit(form.cash_limit, form.credit_limit)
}
