use askama::Template;
use axum::{
    extract::{Path, Query},
    http::header,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use tower_sessions::Session;

use crate::api::middleware::{auth::AuthOperator, session::AppState};
use crate::api::views::{encode_query, render, CardRow, Layout, RequestRow};
use crate::error::{AppError, Result};
use crate::models::{CardStatus, RequestStatus};
use crate::services::gateway::GatewayError;
use crate::services::reports::{self, ReportFilters, ReportFormat, ReportKind, ReportRows};

#[derive(Debug, Clone)]
struct FilterOption {
    code: &'static str,
    label: &'static str,
    selected: bool,
}

#[derive(Template)]
#[template(path = "reports.html")]
struct ReportsPage {
    layout: Layout,
    kind: &'static str,
    start_date: String,
    end_date: String,
    statuses: Vec<FilterOption>,
    card_rows: Vec<CardRow>,
    request_rows: Vec<RequestRow>,
    loaded: bool,
    error: Option<String>,
    /// Filter query reused by the download links
    download_query: String,
}

/// Filter inputs as typed; dates are only parsed once both are present
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilterInput {
    #[serde(default)]
    start_date: String,
    #[serde(default)]
    end_date: String,
    #[serde(default)]
    status: String,
}

impl FilterInput {
    fn is_blank(&self) -> bool {
        self.start_date.trim().is_empty() && self.end_date.trim().is_empty()
    }

    fn filters(&self) -> std::result::Result<ReportFilters, String> {
        let parse = |raw: &str, name: &str| {
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map_err(|_| format!("{} must be a date (YYYY-MM-DD).", name))
        };

        let filters = ReportFilters {
            start_date: parse(&self.start_date, "Start date")?,
            end_date: parse(&self.end_date, "End date")?,
            status: Some(self.status.trim().to_string()).filter(|s| !s.is_empty()),
        };

        if !filters.is_ordered() {
            return Err("Start date must not be after end date.".to_string());
        }

        Ok(filters)
    }
}

fn status_filters(kind: ReportKind, selected: &str) -> Vec<FilterOption> {
    let options: Vec<(&'static str, &'static str)> = match kind {
        ReportKind::Cards => [CardStatus::Inactive, CardStatus::Active, CardStatus::Deactivated]
            .iter()
            .map(|s| (s.code(), s.label()))
            .collect(),
        ReportKind::Requests => [
            RequestStatus::Pending,
            RequestStatus::Approved,
            RequestStatus::Rejected,
        ]
        .iter()
        .map(|s| (s.code(), s.label()))
        .collect(),
    };

    options
        .into_iter()
        .map(|(code, label)| FilterOption {
            code,
            label,
            selected: code == selected.trim(),
        })
        .collect()
}

async fn reports_index() -> Redirect {
    Redirect::to("/reports/cards")
}

async fn report_page(
    operator: AuthOperator,
    session: Session,
    Path(kind): Path<ReportKind>,
    Query(input): Query<FilterInput>,
) -> Result<Html<String>> {
    let mut page = ReportsPage {
        layout: Layout::load(&session, &operator, "reports").await?,
        kind: kind.segment(),
        start_date: input.start_date.trim().to_string(),
        end_date: input.end_date.trim().to_string(),
        statuses: status_filters(kind, &input.status),
        card_rows: Vec::new(),
        request_rows: Vec::new(),
        loaded: false,
        error: None,
        download_query: String::new(),
    };

    if input.is_blank() {
        return render(&page);
    }

    let filters = match input.filters() {
        Ok(filters) => filters,
        Err(message) => {
            page.error = Some(message);
            return render(&page);
        }
    };

    match reports::report_rows(&operator.gateway, kind, &filters).await {
        Ok(ReportRows::Cards(cards)) => {
            page.card_rows = cards.iter().map(CardRow::from_card).collect();
            page.loaded = true;
        }
        Ok(ReportRows::Requests(requests)) => {
            page.request_rows = requests.iter().map(RequestRow::from_request).collect();
            page.loaded = true;
        }
        Err(e @ (GatewayError::Unauthorized | GatewayError::Cancelled)) => return Err(e.into()),
        Err(e) => page.error = Some(e.user_message()),
    }

    let pairs = filters.query();
    let pairs: Vec<(&str, &str)> = pairs.iter().map(|(k, v)| (*k, v.as_str())).collect();
    page.download_query = encode_query(&pairs);

    render(&page)
}

async fn download_report(
    operator: AuthOperator,
    Path((kind, format)): Path<(ReportKind, ReportFormat)>,
    Query(input): Query<FilterInput>,
) -> Result<Response> {
    let filters = input.filters().map_err(AppError::Validation)?;
    let file = reports::export_report(&operator.gateway, kind, format, &filters).await?;

    tracing::info!(
        filename = %file.filename,
        bytes = file.bytes.len(),
        "Report downloaded"
    );

    let disposition = format!("attachment; filename=\"{}\"", file.filename);

    Ok((
        [
            (header::CONTENT_TYPE, file.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.bytes,
    )
        .into_response())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reports", get(reports_index))
        .route("/reports/:kind", get(report_page))
        .route("/reports/:kind/:format", get(download_report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(start: &str, end: &str, status: &str) -> FilterInput {
        FilterInput {
            start_date: start.to_string(),
            end_date: end.to_string(),
            status: status.to_string(),
        }
    }

    #[test]
    fn test_filters_parse() {
        let filters = input("2026-01-01", "2026-01-31", " CACT ").filters().unwrap();

        assert_eq!(filters.status.as_deref(), Some("CACT"));
        assert_eq!(filters.query().len(), 3);
    }

    #[test]
    fn test_filters_reject_bad_input() {
        assert_eq!(
            input("2026-02-01", "2026-01-01", "").filters().unwrap_err(),
            "Start date must not be after end date."
        );
        assert_eq!(
            input("01/02/2026", "2026-01-01", "").filters().unwrap_err(),
            "Start date must be a date (YYYY-MM-DD)."
        );
        assert!(input(" ", "", "").is_blank());
    }

    #[test]
    fn test_status_filters_follow_report_kind() {
        let options = status_filters(ReportKind::Requests, "APPROVED");

        let codes: Vec<&str> = options.iter().map(|o| o.code).collect();
        assert_eq!(codes, vec!["PENDING", "APPROVED", "REJECTED"]);
        assert!(options[1].selected);
    }
}
