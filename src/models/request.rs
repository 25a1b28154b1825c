use serde::{Deserialize, Deserializer, Serialize};

/// Requested lifecycle transition. The ledger uses four codes for two actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasonCode {
    #[serde(rename = "ACTI")]
    Activate,
    #[serde(rename = "CDCL")]
    Close,
    #[serde(rename = "CACT")]
    ActivateStatus,
    #[serde(rename = "DACT")]
    DeactivateStatus,
}

impl ReasonCode {
    pub fn code(&self) -> &'static str {
        match self {
            ReasonCode::Activate => "ACTI",
            ReasonCode::Close => "CDCL",
            ReasonCode::ActivateStatus => "CACT",
            ReasonCode::DeactivateStatus => "DACT",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReasonCode::Activate | ReasonCode::ActivateStatus => "Activate Card",
            ReasonCode::Close => "Cancel Card",
            ReasonCode::DeactivateStatus => "Deactivate Card",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RequestStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "APPROVED")]
    Approved,
    #[serde(rename = "REJECTED")]
    Rejected,
}

impl RequestStatus {
    pub fn code(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Rejected => "REJECTED",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "Pending",
            RequestStatus::Approved => "Approved",
            RequestStatus::Rejected => "Rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(RequestStatus::Pending),
            "APPROVED" => Some(RequestStatus::Approved),
            "REJECTED" => Some(RequestStatus::Rejected),
            _ => None,
        }
    }
}

// Older ledger builds emit lower-case status codes
impl<'de> Deserialize<'de> for RequestStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        RequestStatus::from_code(&raw).ok_or_else(|| {
            serde::de::Error::unknown_variant(&raw, &["PENDING", "APPROVED", "REJECTED"])
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleRequest {
    pub request_id: i64,
    #[serde(default)]
    pub mask_id: Option<String>,
    #[serde(default)]
    pub card_number: Option<String>,
    #[serde(default)]
    pub card_identifier: Option<String>,
    pub request_reason_code: ReasonCode,
    pub status_code: RequestStatus,
    #[serde(default)]
    pub create_time: Option<String>,
    #[serde(default)]
    pub request_user: Option<String>,
    #[serde(default)]
    pub approve_user: Option<String>,
}

impl LifecycleRequest {
    pub fn is_pending(&self) -> bool {
        self.status_code == RequestStatus::Pending
    }

    /// Every reference this request uses for its card
    pub fn card_refs(&self) -> impl Iterator<Item = &str> {
        self.mask_id
            .as_deref()
            .into_iter()
            .chain(self.card_identifier.as_deref())
            .filter(|r| !r.is_empty())
    }

    /// Best reference to show an operator
    pub fn card_ref(&self) -> &str {
        self.card_refs().next().unwrap_or("-")
    }
}

/// Body of `POST /api/card-requests`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequestData {
    pub card_identifier: String,
    pub request_reason_code: ReasonCode,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedRequest {
    pub request_id: i64,
}

/// Body of `PUT /api/card-requests/{id}/process`
#[derive(Debug, Clone, Serialize)]
pub struct ProcessDecision {
    pub approve: bool,
}
