//! Lifecycle request initiation.
//!
//! Decides per card which lifecycle action an operator may lodge and submits
//! it. The ledger is authoritative for every rule here; the checks below only
//! keep the console from offering actions the ledger would refuse and from
//! lodging the same request twice while its own listing catches up.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    request::{CreateRequestData, CreatedRequest},
    Card, CardStatus, LifecycleRequest, Page, ReasonCode,
};
use crate::services::directory;
use crate::services::gateway::{GatewayClient, GatewayError};

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("A request for card {0} was already lodged")]
    AlreadyLodged(String),

    #[error("{action} is not available for card {mask_id}")]
    NotOffered {
        mask_id: String,
        action: LifecycleAction,
    },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl WorkflowError {
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::Gateway(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleAction {
    Activate,
    Deactivate,
}

impl LifecycleAction {
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            LifecycleAction::Activate => ReasonCode::Activate,
            LifecycleAction::Deactivate => ReasonCode::Close,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Activate => "activate",
            LifecycleAction::Deactivate => "deactivate",
        }
    }
}

impl std::fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleAction::Activate => write!(f, "Activate"),
            LifecycleAction::Deactivate => write!(f, "Deactivate"),
        }
    }
}

/// What the console offers for one card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionAvailability {
    Offer(LifecycleAction),
    /// A request is pending on the ledger or was lodged from this session
    Lodged,
    /// Active card with part of its credit limit in use
    OutstandingBalance,
    /// Deactivated cards have no further lifecycle
    Terminal,
}

impl ActionAvailability {
    pub fn offered(&self) -> Option<LifecycleAction> {
        match self {
            ActionAvailability::Offer(action) => Some(*action),
            _ => None,
        }
    }
}

/// Card references with a `PENDING` request in the scanned window
#[derive(Debug, Clone, Default)]
pub struct PendingSet(HashSet<String>);

impl PendingSet {
    pub fn from_requests<'a>(requests: impl IntoIterator<Item = &'a LifecycleRequest>) -> Self {
        let refs = requests
            .into_iter()
            .filter(|r| r.is_pending())
            .flat_map(|r| r.card_refs().map(str::to_string))
            .collect();
        PendingSet(refs)
    }

    pub fn contains(&self, card_ref: &str) -> bool {
        self.0.contains(card_ref)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SubmittedEntry {
    mask_id: String,
    lodged_at: DateTime<Utc>,
}

/// Cards this session lodged a request for, kept until the ledger's listing
/// shows them as pending or the entry ages out. Bounded; the oldest entry is
/// evicted first. Lives in the operator session and is never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedSet {
    entries: Vec<SubmittedEntry>,
}

impl SubmittedSet {
    pub fn contains(&self, mask_id: &str) -> bool {
        self.entries.iter().any(|e| e.mask_id == mask_id)
    }

    pub fn insert(&mut self, mask_id: &str, now: DateTime<Utc>, capacity: usize) {
        self.entries.retain(|e| e.mask_id != mask_id);
        self.entries.push(SubmittedEntry {
            mask_id: mask_id.to_string(),
            lodged_at: now,
        });

        if self.entries.len() > capacity {
            self.entries.sort_by_key(|e| e.lodged_at);
            let excess = self.entries.len() - capacity;
            self.entries.drain(..excess);
        }
    }

    /// Drops entries the ledger now reports as pending and entries older than `ttl`.
    /// Returns how many were dropped.
    pub fn reconcile(&mut self, pending: &PendingSet, now: DateTime<Utc>, ttl: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|e| !pending.contains(&e.mask_id) && now - e.lodged_at < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn action_for(card: &Card, pending: &PendingSet, submitted: &SubmittedSet) -> ActionAvailability {
    let lodged = pending.contains(&card.mask_id) || submitted.contains(&card.mask_id);

    match card.status_code {
        CardStatus::Inactive if lodged => ActionAvailability::Lodged,
        CardStatus::Inactive => ActionAvailability::Offer(LifecycleAction::Activate),
        CardStatus::Active if lodged => ActionAvailability::Lodged,
        CardStatus::Active if card.has_outstanding_balance() => {
            ActionAvailability::OutstandingBalance
        }
        CardStatus::Active => ActionAvailability::Offer(LifecycleAction::Deactivate),
        CardStatus::Deactivated => ActionAvailability::Terminal,
    }
}

/// Cards shown on the request initiation page with the pending set they were judged against
#[derive(Debug, Clone)]
pub struct EligibleCards {
    pub cards: Page<Card>,
    pub pending: PendingSet,
}

/// Loads a card page (or a Mask ID lookup) and, concurrently, the first
/// `window` lifecycle requests to build the pending set.
#[tracing::instrument(skip(gateway))]
pub async fn list_eligible_cards(
    gateway: &GatewayClient,
    page: u64,
    size: u64,
    search: &str,
    window: u64,
) -> Result<EligibleCards, GatewayError> {
    let (cards, requests) = tokio::join!(
        directory::find_cards(gateway, page, size, search),
        gateway.list_requests(0, window),
    );

    let cards = cards?;
    let requests = requests?;
    let pending = PendingSet::from_requests(&requests.content);

    tracing::debug!(
        cards = cards.content.len(),
        scanned_requests = requests.content.len(),
        pending = pending.len(),
        "Loaded eligible cards"
    );

    Ok(EligibleCards { cards, pending })
}

/// Lodges `action` for `card`. Refused locally when the card was already
/// lodged from this session or the action is not the one on offer.
#[tracing::instrument(skip(gateway, card, submitted), fields(mask_id = %card.mask_id))]
pub async fn submit(
    gateway: &GatewayClient,
    card: &Card,
    action: LifecycleAction,
    submitted: &mut SubmittedSet,
    capacity: usize,
) -> Result<CreatedRequest, WorkflowError> {
    match action_for(card, &PendingSet::default(), submitted) {
        ActionAvailability::Offer(offered) if offered == action => {}
        ActionAvailability::Lodged => {
            return Err(WorkflowError::AlreadyLodged(card.mask_id.clone()));
        }
        _ => {
            return Err(WorkflowError::NotOffered {
                mask_id: card.mask_id.clone(),
                action,
            });
        }
    }

    let created = gateway
        .create_request(&CreateRequestData {
            card_identifier: card.mask_id.clone(),
            request_reason_code: action.reason_code(),
        })
        .await?;

    submitted.insert(&card.mask_id, Utc::now(), capacity);

    tracing::info!(
        request_id = created.request_id,
        action = action.as_str(),
        "Lifecycle request lodged"
    );

    Ok(created)
}
