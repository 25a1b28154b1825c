use std::time::Duration;

use reqwest::{header, Client, Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::config::Config;
use crate::models::{
    card::{CardStatusUpdate, CreateCardData, UpdateCardData},
    request::{CreateRequestData, CreatedRequest, ProcessDecision},
    AuthResponse, Card, CardStatus, LifecycleRequest, LoginCredentials, Page,
};
use crate::services::reports::{ReportFilters, ReportFormat, ReportKind};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);
const REQUEST_ID_HEADER: &str = "X-Request-Id";

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("Invalid gateway URL: {0}")]
    InvalidUrl(String),

    #[error("Gateway request timed out")]
    Timeout,

    #[error("HTTP request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Unauthorized by gateway")]
    Unauthorized,

    #[error("Not found: {}", .message.as_deref().unwrap_or("no such record"))]
    NotFound { message: Option<String> },

    #[error("Conflict: {}", .message.as_deref().unwrap_or("conflicts with current state"))]
    Conflict { message: Option<String> },

    #[error("Rejected: {}", .message.as_deref().unwrap_or("rejected by business rules"))]
    Rejected { message: Option<String> },

    #[error("Gateway error (HTTP {status}): {}", .message.as_deref().unwrap_or("no details"))]
    Api { status: u16, message: Option<String> },

    #[error("Unexpected response body: {0}")]
    Decode(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl GatewayError {
    fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Transport(err)
        }
    }

    /// Maps a non-success response onto the error taxonomy
    pub fn from_status(status: StatusCode, body: &[u8]) -> Self {
        let message = error_message(body);

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthorized,
            StatusCode::NOT_FOUND => GatewayError::NotFound { message },
            StatusCode::CONFLICT => GatewayError::Conflict { message },
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                GatewayError::Rejected { message }
            }
            _ => GatewayError::Api {
                status: status.as_u16(),
                message,
            },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GatewayError::Unauthorized)
    }

    /// Text shown to the operator: the ledger's own message when it sent one,
    /// otherwise a message for the class of failure.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::InvalidUrl(_) => "Gateway is misconfigured.".to_string(),
            GatewayError::Timeout => "Network error: the ledger did not respond in time.".to_string(),
            GatewayError::Transport(_) => "Network error: unable to reach the ledger.".to_string(),
            GatewayError::Unauthorized => "Session expired. Please log in again.".to_string(),
            GatewayError::NotFound { message } => message
                .clone()
                .unwrap_or_else(|| "Record not found.".to_string()),
            GatewayError::Conflict { message } => message
                .clone()
                .unwrap_or_else(|| "The request conflicts with the current state.".to_string()),
            GatewayError::Rejected { message } => message
                .clone()
                .unwrap_or_else(|| "The ledger rejected the request.".to_string()),
            GatewayError::Api { status, message } => message
                .clone()
                .unwrap_or_else(|| format!("Unexpected ledger error (HTTP {}).", status)),
            GatewayError::Decode(_) => "Unexpected response from the ledger.".to_string(),
            GatewayError::Cancelled => "Request cancelled.".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

fn error_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
}

/// How a response body is wrapped. Fixed per endpoint family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    /// The payload is the whole body (cards, auth, reports)
    Bare,
    /// The payload sits under `data` (card requests)
    Data,
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

fn decode<T: DeserializeOwned>(body: &[u8], envelope: Envelope) -> Result<T, GatewayError> {
    let decoded = match envelope {
        Envelope::Bare => serde_json::from_slice::<T>(body),
        Envelope::Data => serde_json::from_slice::<DataEnvelope<T>>(body).map(|e| e.data),
    };
    decoded.map_err(|e| GatewayError::Decode(e.to_string()))
}

/// Raw download from the reports endpoints
#[derive(Debug, Clone)]
pub struct Download {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

struct RawResponse {
    status: StatusCode,
    content_type: Option<String>,
    body: Vec<u8>,
}

/// Client for the backend ledger REST API.
///
/// Cloning is cheap. A clone can carry an operator's bearer token and a
/// cancellation token that aborts every call still in flight once cancelled.
#[derive(Clone)]
pub struct GatewayClient {
    http: Client,
    base_url: Url,
    bearer: Option<Secret<String>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("base_url", &self.base_url.as_str())
            .field("authorized", &self.bearer.is_some())
            .finish()
    }
}

impl GatewayClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| GatewayError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::InvalidUrl(format!(
                "{} cannot be used as a base URL",
                base_url
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(GatewayError::Transport)?;

        Ok(Self {
            http,
            base_url,
            bearer: None,
            cancel: CancellationToken::new(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, GatewayError> {
        Self::new(
            &config.gateway_url,
            Duration::from_secs(config.gateway_timeout_secs),
        )
    }

    pub fn with_bearer(&self, token: Secret<String>) -> Self {
        Self {
            bearer: Some(token),
            ..self.clone()
        }
    }

    pub fn with_cancellation(&self, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request_id = Uuid::new_v4().to_string();
        tracing::debug!(%request_id, %method, path = url.path(), "Gateway call");

        let mut builder = self
            .http
            .request(method, url)
            .header(header::ACCEPT, "application/json")
            .header(REQUEST_ID_HEADER, request_id);

        if let Some(token) = &self.bearer {
            builder = builder.bearer_auth(token.expose_secret());
        }

        builder
    }

    /// Sends the request and reads the body, unless the scope is cancelled first
    async fn exchange(&self, builder: RequestBuilder) -> Result<RawResponse, GatewayError> {
        if self.cancel.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }

        let round_trip = async {
            let response = builder.send().await.map_err(GatewayError::from_transport)?;
            let status = response.status();
            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response
                .bytes()
                .await
                .map_err(GatewayError::from_transport)?
                .to_vec();

            Ok::<_, GatewayError>(RawResponse {
                status,
                content_type,
                body,
            })
        };

        let raw = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(GatewayError::Cancelled),
            result = round_trip => result?,
        };

        if !raw.status.is_success() {
            let err = GatewayError::from_status(raw.status, &raw.body);
            if err.is_unauthorized() {
                tracing::warn!(status = %raw.status, "Gateway refused credentials");
            } else {
                tracing::error!(
                    status = %raw.status,
                    body = %String::from_utf8_lossy(&raw.body),
                    "Gateway request failed"
                );
            }
            return Err(err);
        }

        Ok(raw)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        envelope: Envelope,
    ) -> Result<T, GatewayError> {
        let raw = self.exchange(builder).await?;
        decode(&raw.body, envelope)
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
        envelope: Envelope,
    ) -> Result<T, GatewayError> {
        let builder = self.request(method, self.url(segments)?).json(body);
        self.fetch(builder, envelope).await
    }

    // Auth

    #[tracing::instrument(skip(self, credentials), fields(username = %credentials.username))]
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<AuthResponse, GatewayError> {
        self.send_json(Method::POST, &["api", "auth", "login"], credentials, Envelope::Bare)
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), GatewayError> {
        let builder = self.request(Method::POST, self.url(&["api", "auth", "logout"])?);
        self.exchange(builder).await.map(|_| ())
    }

    // Cards

    #[tracing::instrument(skip(self))]
    pub async fn list_cards(&self, page: u64, size: u64) -> Result<Page<Card>, GatewayError> {
        let builder = self
            .request(Method::GET, self.url(&["api", "cards", "paginated"])?)
            .query(&[("page", page), ("size", size)]);
        self.fetch(builder, Envelope::Bare).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_card(&self, mask_id: &str) -> Result<Card, GatewayError> {
        let builder = self.request(Method::GET, self.url(&["api", "cards", mask_id])?);
        self.fetch(builder, Envelope::Bare).await
    }

    #[tracing::instrument(skip(self, data))]
    pub async fn create_card(&self, data: &CreateCardData) -> Result<Card, GatewayError> {
        self.send_json(Method::POST, &["api", "cards"], data, Envelope::Bare)
            .await
    }

    #[tracing::instrument(skip(self, data))]
    pub async fn update_card(
        &self,
        mask_id: &str,
        data: &UpdateCardData,
    ) -> Result<Card, GatewayError> {
        self.send_json(Method::PUT, &["api", "cards", mask_id], data, Envelope::Bare)
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_card_status(
        &self,
        mask_id: &str,
        status: CardStatus,
    ) -> Result<Card, GatewayError> {
        self.send_json(
            Method::PUT,
            &["api", "cards", mask_id, "status"],
            &CardStatusUpdate { status },
            Envelope::Bare,
        )
        .await
    }

    // Lifecycle requests

    #[tracing::instrument(skip(self, data), fields(card = %data.card_identifier, reason = data.request_reason_code.code()))]
    pub async fn create_request(
        &self,
        data: &CreateRequestData,
    ) -> Result<CreatedRequest, GatewayError> {
        self.send_json(Method::POST, &["api", "card-requests"], data, Envelope::Data)
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_requests(
        &self,
        page: u64,
        size: u64,
    ) -> Result<Page<LifecycleRequest>, GatewayError> {
        let builder = self
            .request(Method::GET, self.url(&["api", "card-requests", "paginated"])?)
            .query(&[("page", page), ("size", size)]);
        self.fetch(builder, Envelope::Data).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_request(&self, request_id: i64) -> Result<LifecycleRequest, GatewayError> {
        let id = request_id.to_string();
        let builder = self.request(Method::GET, self.url(&["api", "card-requests", &id])?);
        self.fetch(builder, Envelope::Data).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn process_request(
        &self,
        request_id: i64,
        approve: bool,
    ) -> Result<LifecycleRequest, GatewayError> {
        let id = request_id.to_string();
        self.send_json(
            Method::PUT,
            &["api", "card-requests", &id, "process"],
            &ProcessDecision { approve },
            Envelope::Data,
        )
        .await
    }

    // Reports

    #[tracing::instrument(skip(self, filters))]
    pub async fn report_data<T: DeserializeOwned>(
        &self,
        kind: ReportKind,
        filters: &ReportFilters,
    ) -> Result<Vec<T>, GatewayError> {
        let builder = self
            .request(
                Method::GET,
                self.url(&["api", "reports", "data", kind.segment()])?,
            )
            .query(&filters.query());
        self.fetch(builder, Envelope::Bare).await
    }

    #[tracing::instrument(skip(self, filters))]
    pub async fn download_report(
        &self,
        kind: ReportKind,
        format: ReportFormat,
        filters: &ReportFilters,
    ) -> Result<Download, GatewayError> {
        let builder = self
            .request(
                Method::GET,
                self.url(&["api", "reports", kind.segment(), format.segment()])?,
            )
            .header(header::ACCEPT, format.content_type())
            .query(&filters.query());
        let raw = self.exchange(builder).await?;

        Ok(Download {
            content_type: raw.content_type,
            bytes: raw.body,
        })
    }

    /// Reachability probe used by the health endpoint. Any non-5xx answer counts.
    pub async fn ping(&self) -> Result<(), GatewayError> {
        let response = self
            .http
            .head(self.base_url.clone())
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(GatewayError::from_transport)?;

        if response.status().is_server_error() {
            return Err(GatewayError::Api {
                status: response.status().as_u16(),
                message: None,
            });
        }

        Ok(())
    }
}
