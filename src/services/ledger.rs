use serde::Deserialize;

use crate::models::{page::backend_index, LifecycleRequest, Page, RequestStatus};
use crate::services::gateway::{GatewayClient, GatewayError};

/// Status tab on the request ledger page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LedgerTab {
    #[default]
    All,
    Pending,
    Approved,
    Rejected,
}

impl LedgerTab {
    pub const ALL_TABS: [LedgerTab; 4] = [
        LedgerTab::All,
        LedgerTab::Pending,
        LedgerTab::Approved,
        LedgerTab::Rejected,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            LedgerTab::All => "ALL",
            LedgerTab::Pending => "PENDING",
            LedgerTab::Approved => "APPROVED",
            LedgerTab::Rejected => "REJECTED",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LedgerTab::All => "Registry",
            LedgerTab::Pending => "Queue",
            LedgerTab::Approved => "Released",
            LedgerTab::Rejected => "Denied",
        }
    }

    fn status(&self) -> Option<RequestStatus> {
        match self {
            LedgerTab::All => None,
            LedgerTab::Pending => Some(RequestStatus::Pending),
            LedgerTab::Approved => Some(RequestStatus::Approved),
            LedgerTab::Rejected => Some(RequestStatus::Rejected),
        }
    }

    pub fn matches(&self, request: &LifecycleRequest) -> bool {
        self.status().map_or(true, |s| request.status_code == s)
    }
}

#[derive(Debug, Clone)]
pub struct TabCount {
    pub tab: LedgerTab,
    pub count: usize,
}

/// One ledger page split by tab. Counts cover the fetched page only.
#[derive(Debug, Clone)]
pub struct LedgerView {
    pub rows: Vec<LifecycleRequest>,
    pub tabs: Vec<TabCount>,
    pub pending_on_page: usize,
    pub total_elements: u64,
}

pub fn build_view(page: Page<LifecycleRequest>, tab: LedgerTab) -> LedgerView {
    let tabs = LedgerTab::ALL_TABS
        .iter()
        .map(|t| TabCount {
            tab: *t,
            count: page.content.iter().filter(|r| t.matches(r)).count(),
        })
        .collect();
    let pending_on_page = page.content.iter().filter(|r| r.is_pending()).count();
    let total_elements = page.total_elements;
    let rows = page.content.into_iter().filter(|r| tab.matches(r)).collect();

    LedgerView {
        rows,
        tabs,
        pending_on_page,
        total_elements,
    }
}

pub async fn load_ledger(
    gateway: &GatewayClient,
    page: u64,
    size: u64,
    tab: LedgerTab,
) -> Result<LedgerView, GatewayError> {
    let page = gateway.list_requests(backend_index(page), size).await?;
    Ok(build_view(page, tab))
}

pub async fn get_request(
    gateway: &GatewayClient,
    request_id: i64,
) -> Result<LifecycleRequest, GatewayError> {
    gateway.get_request(request_id).await
}
