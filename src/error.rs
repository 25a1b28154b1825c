use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::gateway::GatewayError;
use crate::services::token_vault::VaultError;

/// Where an operator lands once the ledger stops accepting their token
pub const EXPIRED_LOGIN_PATH: &str = "/login?expired=1";

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("Token vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Gateway(GatewayError::Unauthorized) = self {
            return Redirect::to(EXPIRED_LOGIN_PATH).into_response();
        }

        let error_debug = format!("{:?}", self);

        let (status, error_message) = match self {
            AppError::Gateway(err) => {
                let status = match &err {
                    GatewayError::NotFound { .. } => StatusCode::NOT_FOUND,
                    GatewayError::Conflict { .. } => StatusCode::CONFLICT,
                    GatewayError::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    GatewayError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::BAD_GATEWAY,
                };
                (status, err.user_message())
            }
            AppError::Session(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Session error".to_string(),
            ),
            AppError::Template(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Page could not be rendered".to_string(),
            ),
            AppError::Vault(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Session error".to_string(),
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %error_debug, "Request failed");
        }

        let body = Json(json!({
            "error": error_debug,
            "message": error_message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
