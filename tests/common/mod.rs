//! Ledger fixtures shared by the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use secrecy::Secret;
use serde_json::{json, Value};
use wiremock::MockServer;

use cardconsole::services::gateway::GatewayClient;

pub const TOKEN: &str = "test-token-123";

pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Gateway client for `server` carrying the test bearer token
pub fn gateway(server: &MockServer) -> GatewayClient {
    GatewayClient::new(&server.uri(), Duration::from_secs(5))
        .unwrap()
        .with_bearer(Secret::new(TOKEN.to_string()))
}

pub fn card_json(mask_id: &str, status: &str, credit: i64, available_credit: i64) -> Value {
    json!({
        "maskId": mask_id,
        "cardNumber": "4111111111111111",
        "statusCode": status,
        "creditLimit": credit,
        "cashLimit": credit / 2,
        "availableCreditLimit": available_credit,
        "availableCashLimit": credit / 2,
        "expiryDate": [2030, 12, 1],
        "lastUpdateTime": [2026, 10, 1, 9, 30, 0],
        "lastUpdateUser": "admin"
    })
}

pub fn request_json(request_id: i64, mask_id: &str, reason: &str, status: &str) -> Value {
    json!({
        "requestId": request_id,
        "maskId": mask_id,
        "requestReasonCode": reason,
        "statusCode": status,
        "createTime": "2026-10-15T08:00:00",
        "requestUser": "operator"
    })
}

pub fn page_json(content: Vec<Value>, total_elements: u64) -> Value {
    json!({
        "content": content,
        "totalElements": total_elements,
        "totalPages": 1,
        "pageNumber": 0,
        "pageSize": 10,
        "first": true,
        "last": true
    })
}

/// Card request responses are wrapped in `{data}`
pub fn data(value: Value) -> Value {
    json!({ "data": value })
}
