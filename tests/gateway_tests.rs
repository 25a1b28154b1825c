//! Integration tests for the ledger gateway client using wiremock.
//!
//! These cover request shape (paths, headers, envelopes) and the mapping
//! of ledger failures onto `GatewayError`.

mod common;

use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use cardconsole::models::{CardStatus, LoginCredentials, RequestStatus, UserRole};
use cardconsole::services::gateway::{GatewayClient, GatewayError};
use cardconsole::services::reports::{self, ReportFilters, ReportFormat, ReportKind};

use common::{card_json, data, gateway, page_json, request_json, setup_mock_server, TOKEN};

// =============================================================================
// Request Shape
// =============================================================================

#[tokio::test]
async fn test_bearer_token_and_request_id_sent() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api/cards/M1"))
        .and(header("Authorization", format!("Bearer {}", TOKEN).as_str()))
        .and(header_exists("X-Request-Id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(card_json("M1", "IACT", 10_000, 10_000)))
        .expect(1)
        .mount(&server)
        .await;

    let card = gateway(&server).get_card("M1").await.unwrap();

    assert_eq!(card.mask_id, "M1");
    assert_eq!(card.status_code, CardStatus::Inactive);
    assert_eq!(card.expiry_label(), "12 / 30");
    assert!(card.last_update_time.is_some());
}

#[tokio::test]
async fn test_card_listing_uses_zero_based_page() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api/cards/paginated"))
        .and(query_param("page", "2"))
        .and(query_param("size", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(
            vec![card_json("M11", "CACT", 5_000, 5_000)],
            11,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let page = gateway(&server).list_cards(2, 5).await.unwrap();

    assert_eq!(page.content.len(), 1);
    assert_eq!(page.total_elements, 11);
}

#[tokio::test]
async fn test_login_sends_credentials_without_bearer() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({"username": "admin", "password": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "jwt-abc",
            "username": "admin",
            "userRole": "Admin"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = GatewayClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
    let auth = client
        .login(&LoginCredentials {
            username: "admin".to_string(),
            password: "secret".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(auth.token, "jwt-abc");
    assert_eq!(auth.user_role, UserRole::Admin);

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

// =============================================================================
// Envelopes
// =============================================================================

#[tokio::test]
async fn test_card_requests_are_unwrapped_from_data() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api/card-requests/paginated"))
        .respond_with(ResponseTemplate::new(200).set_body_json(data(page_json(
            vec![request_json(1, "M1", "ACTI", "pending")],
            1,
        ))))
        .mount(&server)
        .await;

    let page = gateway(&server).list_requests(0, 10).await.unwrap();

    assert_eq!(page.content[0].status_code, RequestStatus::Pending);
}

#[tokio::test]
async fn test_bare_card_request_body_is_a_decode_error() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api/card-requests/paginated"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(vec![], 0)))
        .mount(&server)
        .await;

    let result = gateway(&server).list_requests(0, 10).await;

    assert!(matches!(result, Err(GatewayError::Decode(_))));
}

#[tokio::test]
async fn test_unknown_reason_code_is_rejected() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api/card-requests/5"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(data(request_json(5, "M5", "XXXX", "PENDING"))),
        )
        .mount(&server)
        .await;

    let result = gateway(&server).get_request(5).await;

    assert!(matches!(result, Err(GatewayError::Decode(_))));
}

// =============================================================================
// Error Mapping
// =============================================================================

#[tokio::test]
async fn test_status_codes_map_to_errors() {
    let server = setup_mock_server().await;

    for (mask_id, status) in [("U", 401u16), ("F", 403), ("N", 404), ("C", 409), ("B", 400), ("S", 503)] {
        Mock::given(method("GET"))
            .and(path(format!("/api/cards/{}", mask_id)))
            .respond_with(
                ResponseTemplate::new(status).set_body_json(json!({"message": "ledger says no"})),
            )
            .mount(&server)
            .await;
    }

    let client = gateway(&server);

    assert!(matches!(client.get_card("U").await, Err(GatewayError::Unauthorized)));
    assert!(matches!(client.get_card("F").await, Err(GatewayError::Unauthorized)));
    assert!(matches!(client.get_card("N").await, Err(GatewayError::NotFound { .. })));
    assert!(matches!(client.get_card("C").await, Err(GatewayError::Conflict { .. })));
    assert!(matches!(client.get_card("B").await, Err(GatewayError::Rejected { .. })));

    let err = client.get_card("S").await.unwrap_err();
    assert!(matches!(err, GatewayError::Api { status: 503, .. }));
    assert_eq!(err.user_message(), "ledger says no");
}

#[tokio::test]
async fn test_slow_ledger_times_out() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api/cards/M1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(card_json("M1", "IACT", 1_000, 1_000))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client = GatewayClient::new(&server.uri(), Duration::from_millis(100)).unwrap();
    let err = client.get_card("M1").await.unwrap_err();

    assert!(matches!(err, GatewayError::Timeout));
    assert!(err.user_message().starts_with("Network error"));
}

#[tokio::test]
async fn test_cancelled_scope_aborts_call_in_flight() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api/cards/M1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(card_json("M1", "IACT", 1_000, 1_000))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let scope = CancellationToken::new();
    let client = gateway(&server).with_cancellation(scope.child_token());

    let call = tokio::spawn(async move { client.get_card("M1").await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    scope.cancel();

    let result = call.await.unwrap();
    assert!(matches!(result, Err(GatewayError::Cancelled)));
}

// =============================================================================
// Reports & Health
// =============================================================================

#[tokio::test]
async fn test_report_download_is_named_by_date() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api/reports/cards/csv"))
        .and(query_param("startDate", "2026-01-01"))
        .and(query_param("endDate", "2026-01-31"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/csv")
                .set_body_string("maskId,status\nM1,CACT\n"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let filters = ReportFilters {
        start_date: chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        end_date: chrono::NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
        status: None,
    };

    let file = reports::export_report(&gateway(&server), ReportKind::Cards, ReportFormat::Csv, &filters)
        .await
        .unwrap();

    let today = chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string();
    assert_eq!(file.filename, format!("card-report-{}.csv", today));
    assert_eq!(file.content_type, "text/csv");
    assert!(String::from_utf8(file.bytes).unwrap().contains("M1,CACT"));
}

#[tokio::test]
async fn test_ping_accepts_any_non_server_error() {
    let server = setup_mock_server().await;

    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert!(gateway(&server).ping().await.is_ok());
}
