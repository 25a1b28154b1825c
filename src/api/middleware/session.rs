use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer};

use crate::config::Config;
use crate::services::approval::ApprovalConsole;
use crate::services::dashboard::DashboardCounters;
use crate::services::gateway::{GatewayClient, GatewayError};
use crate::services::token_vault::TokenVault;
use crate::services::workflow::SubmittedSet;

/// Session keys used in the application
pub const SESSION_KEY_TOKEN: &str = "sealed_token";
pub const SESSION_KEY_USERNAME: &str = "username";
pub const SESSION_KEY_ROLE: &str = "user_role";
pub const SESSION_KEY_SUBMITTED: &str = "submitted_cards";
pub const SESSION_KEY_FLASH: &str = "flash";

/// Creates a session layer for Axum
pub fn create_session_layer(config: &Config) -> SessionManagerLayer<MemoryStore> {
    SessionManagerLayer::new(MemoryStore::default())
        .with_secure(config.secure_cookies)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(8)))
}

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub gateway: GatewayClient,
    pub approvals: Arc<ApprovalConsole>,
    pub counters: Arc<DashboardCounters>,
    pub vault: Arc<TokenVault>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, GatewayError> {
        let gateway = GatewayClient::from_config(&config)?;
        let approvals = Arc::new(ApprovalConsole::new());
        let counters = Arc::new(DashboardCounters::new(
            approvals.refresh_signal().subscribe(),
            Duration::from_secs(config.counters_ttl_secs),
            config.stats_window,
            config.pending_count_window,
        ));
        let vault = Arc::new(TokenVault::new(&config.session_secret, &config.token_salt));

        Ok(Self {
            config,
            gateway,
            approvals,
            counters,
            vault,
        })
    }
}

impl FromRef<AppState> for GatewayClient {
    fn from_ref(state: &AppState) -> GatewayClient {
        state.gateway.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashKind {
    Success,
    Error,
}

impl FlashKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashKind::Success => "success",
            FlashKind::Error => "error",
        }
    }
}

/// One-shot notification shown on the next rendered page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

pub async fn flash_success(
    session: &Session,
    message: impl Into<String>,
) -> Result<(), tower_sessions::session::Error> {
    set_flash(session, FlashKind::Success, message.into()).await
}

pub async fn flash_error(
    session: &Session,
    message: impl Into<String>,
) -> Result<(), tower_sessions::session::Error> {
    set_flash(session, FlashKind::Error, message.into()).await
}

async fn set_flash(
    session: &Session,
    kind: FlashKind,
    message: String,
) -> Result<(), tower_sessions::session::Error> {
    session
        .insert(SESSION_KEY_FLASH, Flash { kind, message })
        .await
}

/// Removes and returns the pending notification, if any
pub async fn take_flash(session: &Session) -> Result<Option<Flash>, tower_sessions::session::Error> {
    session.remove(SESSION_KEY_FLASH).await
}

pub async fn load_submitted(
    session: &Session,
) -> Result<SubmittedSet, tower_sessions::session::Error> {
    Ok(session
        .get::<SubmittedSet>(SESSION_KEY_SUBMITTED)
        .await?
        .unwrap_or_default())
}

pub async fn store_submitted(
    session: &Session,
    submitted: &SubmittedSet,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(SESSION_KEY_SUBMITTED, submitted).await
}
