use askama::Template;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use secrecy::Secret;
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::middleware::session::{
    flash_success, AppState, SESSION_KEY_ROLE, SESSION_KEY_TOKEN, SESSION_KEY_USERNAME,
};
use crate::api::views::render;
use crate::error::Result;
use crate::models::LoginCredentials;
use crate::services::gateway::GatewayError;

#[derive(Template)]
#[template(path = "login.html")]
struct LoginPage {
    username: String,
    notice: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct LoginQuery {
    #[serde(default)]
    expired: Option<String>,
}

/// Shows the login form. Arriving with `?expired` drops whatever is left of
/// the previous session.
async fn login_page(
    session: Session,
    Query(query): Query<LoginQuery>,
) -> Result<Response> {
    let mut notice = None;

    if query.expired.is_some() {
        session.flush().await?;
        notice = Some(GatewayError::Unauthorized.user_message());
    } else if session.get::<String>(SESSION_KEY_TOKEN).await?.is_some() {
        return Ok(Redirect::to("/").into_response());
    }

    let page = LoginPage {
        username: String::new(),
        notice,
        error: None,
    };

    Ok(render(&page)?.into_response())
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let username = form.username.trim().to_string();

    if username.is_empty() || form.password.is_empty() {
        return login_failed(username, "Username and password are required.".to_string());
    }

    let credentials = LoginCredentials {
        username: username.clone(),
        password: form.password,
    };

    let auth = match state.gateway.login(&credentials).await {
        Ok(auth) => auth,
        Err(GatewayError::Unauthorized) => {
            tracing::warn!(%username, "Login refused");
            return login_failed(username, "Invalid username or password.".to_string());
        }
        Err(e) => return login_failed(username, e.user_message()),
    };

    let sealed = state.vault.seal(&Secret::new(auth.token))?;

    // New session id for the signed-in operator
    session.cycle_id().await?;
    session.insert(SESSION_KEY_TOKEN, sealed).await?;
    session.insert(SESSION_KEY_USERNAME, &auth.username).await?;
    session.insert(SESSION_KEY_ROLE, auth.user_role).await?;

    tracing::info!(username = %auth.username, role = auth.user_role.as_str(), "Operator signed in");

    flash_success(&session, format!("Welcome back, {}.", auth.username)).await?;

    Ok(Redirect::to("/").into_response())
}

fn login_failed(username: String, error: String) -> Result<Response> {
    let page = LoginPage {
        username,
        notice: None,
        error: Some(error),
    };

    Ok((StatusCode::UNAUTHORIZED, render(&page)?).into_response())
}

/// Logs out the operator. The ledger is told best-effort; the local session
/// is always cleared.
async fn logout(State(state): State<AppState>, session: Session) -> Result<Redirect> {
    let sealed: Option<String> = session.get(SESSION_KEY_TOKEN).await?;

    if let Some(token) = sealed.and_then(|s| state.vault.open(&s).ok()) {
        if let Err(e) = state.gateway.with_bearer(token).logout().await {
            tracing::debug!(error = %e, "Ledger logout failed, clearing session anyway");
        }
    }

    session.flush().await?;

    tracing::info!("Operator signed out");

    Ok(Redirect::to("/login"))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/logout", post(logout))
}
