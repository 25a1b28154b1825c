use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_sessions::Session;

use super::session::{AppState, SESSION_KEY_ROLE, SESSION_KEY_TOKEN, SESSION_KEY_USERNAME};
use crate::models::UserRole;
use crate::services::gateway::GatewayClient;

/// Authentication error responses
#[derive(Debug)]
pub enum AuthError {
    Unauthorized,
    SessionError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::Unauthorized => Redirect::to("/login").into_response(),
            AuthError::SessionError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Session error occurred.").into_response()
            }
        }
    }
}

/// The logged-in operator of the current request.
///
/// Carries a gateway client holding the operator's bearer token. Every call
/// made through it is cancelled once the extractor is dropped, which happens
/// when the handler returns or the client goes away.
pub struct AuthOperator {
    pub username: String,
    pub role: UserRole,
    pub gateway: GatewayClient,
    _scope: DropGuard,
}

impl std::fmt::Debug for AuthOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthOperator")
            .field("username", &self.username)
            .field("role", &self.role)
            .finish()
    }
}

/// Opens the sealed token in the session and scopes a gateway client to it
pub async fn get_authenticated_operator(
    session: &Session,
    state: &AppState,
) -> Result<AuthOperator, AuthError> {
    let sealed: String = session
        .get(SESSION_KEY_TOKEN)
        .await
        .map_err(|_| AuthError::SessionError)?
        .ok_or(AuthError::Unauthorized)?;

    let token = match state.vault.open(&sealed) {
        Ok(token) => token,
        Err(e) => {
            // Sealed under a different secret, e.g. before a restart with a new key
            tracing::warn!(error = %e, "Discarding unreadable session token");
            session
                .remove::<String>(SESSION_KEY_TOKEN)
                .await
                .map_err(|_| AuthError::SessionError)?;
            return Err(AuthError::Unauthorized);
        }
    };

    let username: String = session
        .get(SESSION_KEY_USERNAME)
        .await
        .map_err(|_| AuthError::SessionError)?
        .unwrap_or_default();
    let role: UserRole = session
        .get(SESSION_KEY_ROLE)
        .await
        .map_err(|_| AuthError::SessionError)?
        .unwrap_or(UserRole::User);

    let scope = CancellationToken::new();
    let gateway = state
        .gateway
        .with_bearer(token)
        .with_cancellation(scope.child_token());

    Ok(AuthOperator {
        username,
        role,
        gateway,
        _scope: scope.drop_guard(),
    })
}

#[async_trait]
impl FromRequestParts<AppState> for AuthOperator {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|_| AuthError::SessionError)?;

        get_authenticated_operator(&session, state).await
    }
}
