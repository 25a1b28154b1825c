use std::collections::BTreeMap;

use validator::{Validate, ValidationErrors};

use crate::models::{
    card::{CreateCardData, CreateCardForm, UpdateCardData, UpdateCardForm},
    page::backend_index,
    Card, CardStatus, Page,
};
use crate::services::gateway::{GatewayClient, GatewayError};

#[derive(thiserror::Error, Debug)]
pub enum DirectoryError {
    #[error("Card form is invalid")]
    Invalid(FieldErrors),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// First validation message per form field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<ValidationErrors> for FieldErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields = BTreeMap::new();

        for (field, list) in errors.field_errors() {
            // Struct-level checks only compare the two limits
            let field = match field.as_ref() {
                "__all__" => "cash_limit".to_string(),
                other => other.to_string(),
            };
            if let Some(first) = list.first() {
                let message = first
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| first.code.to_string());
                fields.entry(field).or_insert(message);
            }
        }

        FieldErrors(fields)
    }
}

/// A page of cards, or a direct Mask ID lookup when a search term is given.
///
/// A failed lookup reads as "no match". Only an expired session or a
/// cancelled scope is reported as an error.
pub async fn find_cards(
    gateway: &GatewayClient,
    page: u64,
    size: u64,
    search: &str,
) -> Result<Page<Card>, GatewayError> {
    let term = search.trim();
    if term.is_empty() {
        return gateway.list_cards(backend_index(page), size).await;
    }

    match gateway.get_card(term).await {
        Ok(card) => Ok(Page::single(card)),
        Err(err @ (GatewayError::Unauthorized | GatewayError::Cancelled)) => Err(err),
        Err(err) => {
            tracing::debug!(search = %term, error = %err, "Card lookup found nothing");
            Ok(Page::empty())
        }
    }
}

pub async fn get_card(gateway: &GatewayClient, mask_id: &str) -> Result<Card, GatewayError> {
    gateway.get_card(mask_id).await
}

pub async fn create_card(
    gateway: &GatewayClient,
    form: &CreateCardForm,
) -> Result<Card, DirectoryError> {
    form.validate().map_err(|e| DirectoryError::Invalid(e.into()))?;

    let card = gateway.create_card(&CreateCardData::from(form)).await?;

    tracing::info!(mask_id = %card.mask_id, "Card provisioned");

    Ok(card)
}

pub async fn update_card(
    gateway: &GatewayClient,
    mask_id: &str,
    form: &UpdateCardForm,
) -> Result<Card, DirectoryError> {
    form.validate().map_err(|e| DirectoryError::Invalid(e.into()))?;

    let card = gateway
        .update_card(mask_id, &UpdateCardData::from(form))
        .await?;

    tracing::info!(mask_id = %card.mask_id, "Card parameters updated");

    Ok(card)
}

pub async fn update_card_status(
    gateway: &GatewayClient,
    mask_id: &str,
    status: CardStatus,
) -> Result<Card, GatewayError> {
    let card = gateway.update_card_status(mask_id, status).await?;

    tracing::info!(
        mask_id = %card.mask_id,
        status = card.status_code.code(),
        "Card status updated"
    );

    Ok(card)
}
