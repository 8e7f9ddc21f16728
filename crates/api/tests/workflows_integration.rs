//! Workflow commands, manual runs and execution history.

mod common;

use axum::http::{Method, StatusCode};
use common::{
    configure_sender, empty_request, parse_response_body, staff_json_request, staff_request,
    test_context, TestContext, SHOP_ID, STAFF_ID, TEMPLATE_ID,
};
use serde_json::{json, Value};
use tower::ServiceExt;

fn workflows_uri() -> String {
    format!("/api/v1/shops/{}/workflows", SHOP_ID)
}

fn visit_cycle_workflow(title: &str) -> Value {
    json!({
        "title": title,
        "triggerType": "visit-cycle",
        "triggerConfig": { "visitCycleDays": 30 },
        "actionType": "message-only",
        "actionConfig": {
            "messageTemplateId": TEMPLATE_ID,
            "sendTime": "10:00:00"
        }
    })
}

async fn create(ctx: &TestContext, body: Value) -> (StatusCode, Value) {
    let response = ctx
        .app
        .clone()
        .oneshot(staff_json_request(
            Method::POST,
            &workflows_uri(),
            STAFF_ID,
            body,
        ))
        .await
        .unwrap();
    let status = response.status();
    (status, parse_response_body(response).await)
}

// ============================================================================
// Creation and validation
// ============================================================================

#[tokio::test]
async fn test_create_workflow() {
    let ctx = test_context().await;

    let (status, body) = create(&ctx, visit_cycle_workflow("Monthly check-in")).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["title"], "Monthly check-in");
    assert_eq!(body["isActive"], true);
    assert_eq!(body["staffId"], STAFF_ID);
    assert_eq!(body["triggerType"], "visit-cycle");
    assert_eq!(body["trigger"]["visitCycleDays"], 30);
    assert_eq!(body["actionType"], "message-only");
    assert_eq!(body["executionCount"], 0);
    assert_eq!(body["successRate"], 0.0);
}

#[tokio::test]
async fn test_visit_cycle_without_days_is_rejected() {
    let ctx = test_context().await;

    let (status, body) = create(
        &ctx,
        json!({
            "title": "Broken cycle",
            "triggerType": "visit-cycle",
            "triggerConfig": {},
            "actionType": "message-only",
            "actionConfig": { "messageTemplateId": TEMPLATE_ID, "sendTime": "10:00:00" }
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let response = ctx
        .app
        .clone()
        .oneshot(empty_request(Method::GET, &workflows_uri()))
        .await
        .unwrap();
    let body = parse_response_body(response).await;
    assert!(body["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_message_action_without_template_is_rejected() {
    let ctx = test_context().await;

    let (status, _) = create(
        &ctx,
        json!({
            "title": "No template",
            "triggerType": "birthday",
            "triggerConfig": { "birthdayDaysBefore": 3 },
            "actionType": "message-only",
            "actionConfig": { "sendTime": "10:00:00" }
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_title_conflicts() {
    let ctx = test_context().await;

    let (status, _) = create(&ctx, visit_cycle_workflow("Monthly check-in")).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = create(&ctx, visit_cycle_workflow("Monthly check-in")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn test_missing_staff_header_is_bad_request() {
    let ctx = test_context().await;

    let response = ctx
        .app
        .clone()
        .oneshot(common::json_request(
            Method::POST,
            &workflows_uri(),
            visit_cycle_workflow("Monthly check-in"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::test]
async fn test_only_creator_may_update_or_delete() {
    let ctx = test_context().await;
    let (_, body) = create(&ctx, visit_cycle_workflow("Monthly check-in")).await;
    let uri = format!("{}/{}", workflows_uri(), body["id"]);

    let response = ctx
        .app
        .clone()
        .oneshot(staff_json_request(
            Method::PUT,
            &uri,
            STAFF_ID + 1,
            visit_cycle_workflow("Renamed"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = ctx
        .app
        .clone()
        .oneshot(staff_request(Method::DELETE, &uri, STAFF_ID + 1))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = ctx
        .app
        .clone()
        .oneshot(staff_json_request(
            Method::PUT,
            &uri,
            STAFF_ID,
            visit_cycle_workflow("Renamed"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["title"], "Renamed");
}

#[tokio::test]
async fn test_delete_hides_workflow() {
    let ctx = test_context().await;
    let (_, body) = create(&ctx, visit_cycle_workflow("Monthly check-in")).await;
    let uri = format!("{}/{}", workflows_uri(), body["id"]);

    let response = ctx
        .app
        .clone()
        .oneshot(staff_request(Method::DELETE, &uri, STAFF_ID))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = ctx
        .app
        .clone()
        .oneshot(empty_request(Method::GET, &uri))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The title is free again once the workflow is deleted.
    let (status, _) = create(&ctx, visit_cycle_workflow("Monthly check-in")).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_deactivate_filters_active_listing() {
    let ctx = test_context().await;
    let (_, first) = create(&ctx, visit_cycle_workflow("First")).await;
    create(&ctx, visit_cycle_workflow("Second")).await;

    let response = ctx
        .app
        .clone()
        .oneshot(empty_request(
            Method::POST,
            &format!("{}/{}/deactivate", workflows_uri(), first["id"]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["isActive"], false);

    let response = ctx
        .app
        .clone()
        .oneshot(empty_request(
            Method::GET,
            &format!("{}?activeOnly=true", workflows_uri()),
        ))
        .await
        .unwrap();
    let body = parse_response_body(response).await;
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], "Second");

    let response = ctx
        .app
        .clone()
        .oneshot(empty_request(Method::GET, &workflows_uri()))
        .await
        .unwrap();
    let body = parse_response_body(response).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
}

// ============================================================================
// Runs
// ============================================================================

#[tokio::test]
async fn test_run_records_execution_and_counters() {
    let ctx = test_context().await;
    configure_sender(&ctx, SHOP_ID).await;
    let (_, body) = create(&ctx, visit_cycle_workflow("Monthly check-in")).await;
    let uri = format!("{}/{}", workflows_uri(), body["id"]);

    let response = ctx
        .app
        .clone()
        .oneshot(empty_request(Method::POST, &format!("{}/run", uri)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let execution = parse_response_body(response).await;
    assert_eq!(execution["status"], "SUCCESS");
    // Two customers have phone numbers, one does not.
    assert_eq!(execution["targetCount"], 3);
    assert_eq!(execution["successCount"], 2);
    assert_eq!(execution["failureCount"], 1);

    let messages = ctx.messages.all().await;
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.workflow_id.is_some()));
    assert!(messages.iter().all(|m| m.template_id == Some(TEMPLATE_ID)));

    let response = ctx
        .app
        .clone()
        .oneshot(empty_request(Method::GET, &uri))
        .await
        .unwrap();
    let workflow = parse_response_body(response).await;
    assert_eq!(workflow["executionCount"], 1);
    assert_eq!(workflow["successCount"], 1);
    assert_eq!(workflow["successRate"], 100.0);
    assert!(workflow["nextScheduledAt"].is_string());

    let response = ctx
        .app
        .clone()
        .oneshot(empty_request(Method::GET, &format!("{}/executions", uri)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let history = parse_response_body(response).await;
    assert_eq!(history["items"].as_array().unwrap().len(), 1);
    assert_eq!(history["items"][0]["triggerType"], "visit-cycle");
}

#[tokio::test]
async fn test_notification_workflow_reaches_sink() {
    let ctx = test_context().await;
    let (status, body) = create(
        &ctx,
        json!({
            "title": "VIP follow-up",
            "triggerType": "vip-attention-needed",
            "actionType": "system-notification",
            "actionConfig": {
                "notificationTitle": "VIP needs attention",
                "notificationContent": "Call before Friday",
                "notificationLevel": "WARNING"
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let response = ctx
        .app
        .clone()
        .oneshot(empty_request(
            Method::POST,
            &format!("{}/{}/run", workflows_uri(), body["id"]),
        ))
        .await
        .unwrap();
    let execution = parse_response_body(response).await;
    assert_eq!(execution["successCount"], 1);

    let delivered = ctx.notifications.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].title, "VIP needs attention");
    assert!(ctx.messages.all().await.is_empty());
}

#[tokio::test]
async fn test_run_inactive_workflow_conflicts() {
    let ctx = test_context().await;
    let (status, body) = create(
        &ctx,
        json!({
            "title": "Paused",
            "triggerType": "visit-cycle",
            "triggerConfig": { "visitCycleDays": 30 },
            "actionType": "message-only",
            "actionConfig": { "messageTemplateId": TEMPLATE_ID, "sendTime": "10:00:00" },
            "isActive": false
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["isActive"], false);

    let response = ctx
        .app
        .clone()
        .oneshot(empty_request(
            Method::POST,
            &format!("{}/{}/run", workflows_uri(), body["id"]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
