use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::models::{Card, LifecycleRequest};
use crate::services::gateway::{Download, GatewayClient, GatewayError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Cards,
    Requests,
}

impl ReportKind {
    pub fn segment(&self) -> &'static str {
        match self {
            ReportKind::Cards => "cards",
            ReportKind::Requests => "requests",
        }
    }

    fn file_stem(&self) -> &'static str {
        match self {
            ReportKind::Cards => "card-report",
            ReportKind::Requests => "request-report",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Csv,
    Pdf,
}

impl ReportFormat {
    pub fn segment(&self) -> &'static str {
        match self {
            ReportFormat::Csv => "csv",
            ReportFormat::Pdf => "pdf",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Csv => "text/csv",
            ReportFormat::Pdf => "application/pdf",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFilters {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub status: Option<String>,
}

impl ReportFilters {
    /// Query string pairs; an empty status filter is left out
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("startDate", self.start_date.format("%Y-%m-%d").to_string()),
            ("endDate", self.end_date.format("%Y-%m-%d").to_string()),
        ];
        if let Some(status) = self.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            pairs.push(("status", status.to_string()));
        }
        pairs
    }

    pub fn is_ordered(&self) -> bool {
        self.start_date <= self.end_date
    }
}

/// Rows of either report
#[derive(Debug, Clone)]
pub enum ReportRows {
    Cards(Vec<Card>),
    Requests(Vec<LifecycleRequest>),
}

impl ReportRows {
    pub fn len(&self) -> usize {
        match self {
            ReportRows::Cards(rows) => rows.len(),
            ReportRows::Requests(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub async fn report_rows(
    gateway: &GatewayClient,
    kind: ReportKind,
    filters: &ReportFilters,
) -> Result<ReportRows, GatewayError> {
    let rows = match kind {
        ReportKind::Cards => ReportRows::Cards(gateway.report_data(kind, filters).await?),
        ReportKind::Requests => ReportRows::Requests(gateway.report_data(kind, filters).await?),
    };

    tracing::info!(kind = kind.segment(), rows = rows.len(), "Report data loaded");

    Ok(rows)
}

/// A report file ready to hand to the browser
#[derive(Debug, Clone)]
pub struct ReportFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

pub fn report_filename(kind: ReportKind, format: ReportFormat, on: NaiveDate) -> String {
    format!(
        "{}-{}.{}",
        kind.file_stem(),
        on.format("%Y-%m-%d"),
        format.segment()
    )
}

pub async fn export_report(
    gateway: &GatewayClient,
    kind: ReportKind,
    format: ReportFormat,
    filters: &ReportFilters,
) -> Result<ReportFile, GatewayError> {
    let Download {
        content_type,
        bytes,
    } = gateway.download_report(kind, format, filters).await?;

    Ok(ReportFile {
        filename: report_filename(kind, format, Utc::now().date_naive()),
        content_type: content_type.unwrap_or_else(|| format.content_type().to_string()),
        bytes,
    })
}
