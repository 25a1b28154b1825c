//! Workflow, approval and dashboard behavior against a mocked ledger.

mod common;

use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use cardconsole::models::Card;
use cardconsole::services::approval::{ApprovalConsole, ApprovalError, RowMarker};
use cardconsole::services::dashboard::DashboardCounters;
use cardconsole::services::directory;
use cardconsole::services::gateway::GatewayError;
use cardconsole::services::workflow::{
    self, action_for, ActionAvailability, LifecycleAction, SubmittedSet, WorkflowError,
};

use common::{card_json, data, gateway, page_json, request_json, setup_mock_server};

// =============================================================================
// Workflow Initiator
// =============================================================================

#[tokio::test]
async fn test_activation_request_for_inactive_card() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api/cards/M1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(card_json("M1", "IACT", 10_000, 10_000)))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/card-requests"))
        .and(body_json(json!({"cardIdentifier": "M1", "requestReasonCode": "ACTI"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(data(json!({"requestId": 7}))))
        .expect(1)
        .mount(&server)
        .await;

    let client = gateway(&server);
    let card = client.get_card("M1").await.unwrap();
    let mut submitted = SubmittedSet::default();

    let created = workflow::submit(&client, &card, LifecycleAction::Activate, &mut submitted, 256)
        .await
        .unwrap();

    assert_eq!(created.request_id, 7);
    assert!(submitted.contains("M1"));

    // The card is now lodged for this operator without waiting for a reload
    let again = workflow::submit(&client, &card, LifecycleAction::Activate, &mut submitted, 256).await;
    assert!(matches!(again, Err(WorkflowError::AlreadyLodged(_))));
}

#[tokio::test]
async fn test_outstanding_balance_blocks_closure() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api/cards/paginated"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(
            vec![card_json("M2", "CACT", 10_000, 4_000)],
            1,
        )))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/card-requests/paginated"))
        .respond_with(ResponseTemplate::new(200).set_body_json(data(page_json(vec![], 0))))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/card-requests"))
        .respond_with(ResponseTemplate::new(201).set_body_json(data(json!({"requestId": 1}))))
        .expect(0)
        .mount(&server)
        .await;

    let client = gateway(&server);
    let eligible = workflow::list_eligible_cards(&client, 1, 5, "", 1000).await.unwrap();
    let card = &eligible.cards.content[0];
    let mut submitted = SubmittedSet::default();

    assert_eq!(
        action_for(card, &eligible.pending, &submitted),
        ActionAvailability::OutstandingBalance
    );

    let result = workflow::submit(&client, card, LifecycleAction::Deactivate, &mut submitted, 256).await;
    assert!(matches!(result, Err(WorkflowError::NotOffered { .. })));
    assert!(submitted.is_empty());
}

#[tokio::test]
async fn test_pending_requests_lock_their_cards() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api/cards/paginated"))
        .and(query_param("page", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(
            vec![
                card_json("M1", "IACT", 10_000, 10_000),
                card_json("M2", "CACT", 10_000, 10_000),
                card_json("M3", "CACT", 10_000, 10_000),
            ],
            3,
        )))
        .mount(&server)
        .await;

    let mut by_identifier = request_json(2, "", "CDCL", "PENDING");
    by_identifier["maskId"] = serde_json::Value::Null;
    by_identifier["cardIdentifier"] = json!("M2");

    Mock::given(method("GET"))
        .and(path("/api/card-requests/paginated"))
        .and(query_param("page", "0"))
        .and(query_param("size", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(data(page_json(
            vec![
                request_json(1, "M1", "ACTI", "pending"),
                by_identifier,
                request_json(3, "M3", "CDCL", "REJECTED"),
            ],
            3,
        ))))
        .mount(&server)
        .await;

    let eligible = workflow::list_eligible_cards(&gateway(&server), 1, 5, "  ", 1000)
        .await
        .unwrap();
    let submitted = SubmittedSet::default();

    let actions: Vec<ActionAvailability> = eligible
        .cards
        .content
        .iter()
        .map(|card| action_for(card, &eligible.pending, &submitted))
        .collect();

    assert_eq!(
        actions,
        vec![
            ActionAvailability::Lodged,
            ActionAvailability::Lodged,
            ActionAvailability::Offer(LifecycleAction::Deactivate),
        ]
    );
}

#[tokio::test]
async fn test_failed_submission_leaves_submitted_set_alone() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/api/card-requests"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(json!({"message": "A pending request already exists"})),
        )
        .mount(&server)
        .await;

    let card: Card = serde_json::from_value(card_json("M1", "IACT", 10_000, 10_000)).unwrap();
    let mut submitted = SubmittedSet::default();

    let err = workflow::submit(&gateway(&server), &card, LifecycleAction::Activate, &mut submitted, 256)
        .await
        .unwrap_err();

    assert_eq!(err.user_message(), "A pending request already exists");
    assert!(submitted.is_empty());
}

#[tokio::test]
async fn test_listing_fails_when_request_scan_fails() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api/cards/paginated"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(vec![], 0)))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/card-requests/paginated"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = workflow::list_eligible_cards(&gateway(&server), 1, 5, "", 1000).await;

    assert!(matches!(result, Err(GatewayError::Api { status: 500, .. })));
}

#[tokio::test]
async fn test_reconcile_hands_over_to_server_pending_set() {
    let mut submitted = SubmittedSet::default();
    let now = Utc::now();
    submitted.insert("M1", now, 256);
    submitted.insert("M2", now, 256);

    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/api/cards/paginated"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(vec![], 0)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/card-requests/paginated"))
        .respond_with(ResponseTemplate::new(200).set_body_json(data(page_json(
            vec![request_json(1, "M1", "ACTI", "PENDING")],
            1,
        ))))
        .mount(&server)
        .await;

    let eligible = workflow::list_eligible_cards(&gateway(&server), 1, 5, "", 1000)
        .await
        .unwrap();
    let dropped = submitted.reconcile(&eligible.pending, now, chrono::Duration::seconds(120));

    assert_eq!(dropped, 1);
    assert!(!submitted.contains("M1"));
    assert!(submitted.contains("M2"));
}

// =============================================================================
// Card Directory
// =============================================================================

#[tokio::test]
async fn test_search_miss_is_an_empty_page() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api/cards/NOPE"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Card not found"})))
        .mount(&server)
        .await;

    let page = directory::find_cards(&gateway(&server), 1, 5, " NOPE ").await.unwrap();

    assert!(page.content.is_empty());
    assert_eq!(page.total_elements, 0);
}

#[tokio::test]
async fn test_search_hit_is_a_single_row() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api/cards/M9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(card_json("M9", "DACT", 1_000, 1_000)))
        .mount(&server)
        .await;

    let page = directory::find_cards(&gateway(&server), 3, 5, "M9").await.unwrap();

    assert_eq!(page.content.len(), 1);
    assert_eq!(page.total_elements, 1);
}

#[tokio::test]
async fn test_search_with_expired_session_still_fails() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api/cards/M1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = directory::find_cards(&gateway(&server), 1, 5, "M1").await;

    assert!(matches!(result, Err(GatewayError::Unauthorized)));
}

// =============================================================================
// Approval Console
// =============================================================================

fn ten_requests_three_pending() -> serde_json::Value {
    let content = (1..=10)
        .map(|id| {
            let status = match id {
                2 | 5 | 9 => "PENDING",
                1 | 3 | 4 | 6 => "APPROVED",
                _ => "REJECTED",
            };
            request_json(id, &format!("M{}", id), "ACTI", status)
        })
        .collect();
    data(page_json(content, 10))
}

#[tokio::test]
async fn test_queue_shows_only_pending_rows() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api/card-requests/paginated"))
        .and(query_param("page", "0"))
        .and(query_param("size", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ten_requests_three_pending()))
        .mount(&server)
        .await;

    let console = ApprovalConsole::new();
    let queue = console.load_pending(&gateway(&server), 1, 10).await.unwrap();

    let ids: Vec<i64> = queue.rows.iter().map(|r| r.request.request_id).collect();
    assert_eq!(ids, vec![2, 5, 9]);
    assert_eq!(queue.total_elements, 10);
    assert!(queue.rows.iter().all(|r| r.marker == RowMarker::Idle));
}

#[tokio::test]
async fn test_rejected_decision_keeps_row_and_counters() {
    let server = setup_mock_server().await;

    Mock::given(method("PUT"))
        .and(path("/api/card-requests/42/process"))
        .and(body_json(json!({"approve": false})))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"message": "Request is locked"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let console = ApprovalConsole::new();
    let err = console
        .decide(&gateway(&server), 42, false)
        .await
        .unwrap_err();

    assert!(matches!(err, ApprovalError::Gateway(GatewayError::Conflict { .. })));
    assert_eq!(err.user_message(), "Request is locked");
    assert_eq!(console.markers().get(42), RowMarker::Idle);
    assert_eq!(console.refresh_signal().current(), 0);
}

#[tokio::test]
async fn test_already_resolved_request_leaves_queue_on_reload() {
    let server = setup_mock_server().await;

    Mock::given(method("PUT"))
        .and(path("/api/card-requests/2/process"))
        .respond_with(ResponseTemplate::new(200).set_body_json(data(request_json(
            2, "M2", "ACTI", "APPROVED",
        ))))
        .mount(&server)
        .await;

    // The reload no longer lists request 2 as pending
    Mock::given(method("GET"))
        .and(path("/api/card-requests/paginated"))
        .respond_with(ResponseTemplate::new(200).set_body_json(data(page_json(
            vec![
                request_json(2, "M2", "ACTI", "APPROVED"),
                request_json(5, "M5", "CDCL", "PENDING"),
            ],
            2,
        ))))
        .mount(&server)
        .await;

    let client = gateway(&server);
    let console = ApprovalConsole::new();

    let decided = console.decide(&client, 2, true).await.unwrap();
    assert!(decided.status_code.is_terminal());
    assert_eq!(console.markers().get(2), RowMarker::Settled);
    assert_eq!(console.refresh_signal().current(), 1);

    let queue = console.load_pending(&client, 1, 10).await.unwrap();
    let ids: Vec<i64> = queue.rows.iter().map(|r| r.request.request_id).collect();
    assert_eq!(ids, vec![5]);
    assert_eq!(console.markers().get(2), RowMarker::Idle);
}

#[tokio::test]
async fn test_concurrent_decisions_on_distinct_rows() {
    let server = setup_mock_server().await;

    for id in [11, 12] {
        Mock::given(method("PUT"))
            .and(path(format!("/api/card-requests/{}/process", id)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(data(request_json(id, "M", "ACTI", "APPROVED")))
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = gateway(&server);
    let console = ApprovalConsole::new();

    let (a, b) = tokio::join!(console.decide(&client, 11, true), console.decide(&client, 12, true));

    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(console.refresh_signal().current(), 2);
}

#[tokio::test]
async fn test_abandoned_decision_frees_the_row() {
    let server = setup_mock_server().await;

    Mock::given(method("PUT"))
        .and(path("/api/card-requests/42/process"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(data(request_json(42, "M42", "ACTI", "REJECTED")))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client = gateway(&server);
    let console = ApprovalConsole::new();

    // The operator navigates away before the ledger answers
    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), console.decide(&client, 42, true)).await;
    assert!(abandoned.is_err());

    assert_eq!(console.markers().get(42), RowMarker::Idle);
    assert_eq!(console.markers().in_flight(), 0);
    assert_eq!(console.refresh_signal().current(), 0);

    let decided = console.decide(&client, 42, false).await.unwrap();
    assert!(decided.status_code.is_terminal());
    assert_eq!(console.markers().get(42), RowMarker::Settled);
}

// =============================================================================
// Dashboard
// =============================================================================

#[tokio::test]
async fn test_dashboard_counts_and_refetch_after_decision() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api/cards/paginated"))
        .and(query_param("size", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(
            vec![
                card_json("M1", "CACT", 1_000, 1_000),
                card_json("M2", "CACT", 1_000, 1_000),
                card_json("M3", "IACT", 1_000, 1_000),
                card_json("M4", "DACT", 1_000, 1_000),
            ],
            1204,
        )))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/card-requests/paginated"))
        .and(query_param("size", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ten_requests_three_pending()))
        .expect(2)
        .mount(&server)
        .await;

    let client = gateway(&server);
    let console = ApprovalConsole::new();
    let counters = DashboardCounters::new(
        console.refresh_signal().subscribe(),
        Duration::from_secs(60),
        1000,
        100,
    );

    let first = counters.stats(&client).await.unwrap();
    assert_eq!(first.total_cards, 1204);
    assert_eq!(first.active_cards, 2);
    assert_eq!(first.inactive_cards, 1);
    assert_eq!(first.pending_approvals, 3);

    // Served from cache
    assert_eq!(counters.stats(&client).await.unwrap(), first);

    console.refresh_signal().notify();
    counters.stats(&client).await.unwrap();
}

#[tokio::test]
async fn test_dashboard_degrades_failed_source_to_zero() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/api/cards/paginated"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(
            vec![card_json("M1", "CACT", 1_000, 1_000)],
            1,
        )))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/card-requests/paginated"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let console = ApprovalConsole::new();
    let counters = DashboardCounters::new(
        console.refresh_signal().subscribe(),
        Duration::from_secs(60),
        1000,
        100,
    );

    let stats = counters.stats(&gateway(&server)).await.unwrap();

    assert_eq!(stats.total_cards, 1);
    assert_eq!(stats.active_cards, 1);
    assert_eq!(stats.pending_approvals, 0);
}

#[tokio::test]
async fn test_dashboard_expired_session_is_an_error() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let console = ApprovalConsole::new();
    let counters = DashboardCounters::new(
        console.refresh_signal().subscribe(),
        Duration::from_secs(60),
        1000,
        100,
    );

    let result = counters.stats(&gateway(&server)).await;

    assert!(matches!(result, Err(GatewayError::Unauthorized)));
}
