mod common;

use common::*;
use httpmock::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;
use support_triage::{build_router, AppState, SqliteTicketStore, TriageAgent};
use tempfile::TempDir;

struct TestApp {
    base_url: String,
    client: reqwest::Client,
    _temp_dir: TempDir,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// 在隨機 port 上啟動 API，LLM 指向 mock server
async fn spawn_app(server: &MockServer) -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(server, temp_dir.path());

    let agent = TriageAgent::from_config(&config).unwrap();
    let store = Arc::new(SqliteTicketStore::open_in_memory().unwrap());
    let state = Arc::new(AppState::new(agent, store));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });

    TestApp {
        base_url: format!("http://{}", addr),
        client: reqwest::Client::new(),
        _temp_dir: temp_dir,
    }
}

async fn mock_classification(server: &MockServer, intent: &str, priority: &str, confidence: f64) {
    mock_chat(
        server,
        CLASSIFY_MARKER,
        json!({
            "intent": intent,
            "priority": priority,
            "confidence": confidence,
            "reasoning": "test"
        }),
    )
    .await;
    mock_chat(
        server,
        DRAFT_MARKER,
        json!({
            "subject": "Re: your ticket",
            "body": "Thanks for contacting us.",
            "citations": ["faq.md"],
            "needs_clarification": false
        }),
    )
    .await;
}

async fn post_ticket(app: &TestApp, body: Value) -> reqwest::Response {
    app.client
        .post(app.url("/tickets"))
        .json(&body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let server = MockServer::start_async().await;
    let app = spawn_app(&server).await;

    let response = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.json::<Value>().await.unwrap(), json!({"status": "ok"}));
}

#[tokio::test]
async fn test_auto_send_ticket_has_no_review() {
    let server = MockServer::start_async().await;
    mock_classification(&server, "shipping_delivery", "P2", 0.92).await;
    let app = spawn_app(&server).await;

    let response = post_ticket(
        &app,
        json!({"subject": "Where is my parcel?", "body": "Ordered last week, call 9876543210"}),
    )
    .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();

    assert_eq!(body["ticket"]["channel"], "api");
    assert_eq!(body["agent_run"]["decision"], "auto_send");
    assert_eq!(body["agent_run"]["intent"], "shipping_delivery");
    assert_eq!(
        body["agent_run"]["draft_reply"],
        "SUBJECT: Re: your ticket\n\nThanks for contacting us."
    );
    assert!(body["review"].is_null());
    assert_eq!(
        body["pipeline_output"]["redacted"]["body"],
        "Ordered last week, call [REDACTED:PHONE]"
    );

    let ticket_id = body["ticket"]["id"].as_i64().unwrap();
    let detail: Value = app
        .client
        .get(app.url(&format!("/tickets/{}", ticket_id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["ticket"]["subject"], "Where is my parcel?");
    assert_eq!(detail["latest_agent_run"]["id"], body["agent_run"]["id"]);

    let metrics = app.client.get(app.url("/metrics")).send().await.unwrap();
    assert_eq!(
        metrics.headers()["content-type"],
        "text/plain; version=0.0.4"
    );
    let text = metrics.text().await.unwrap();
    assert!(text.contains("tickets_total 1\n"));
    assert!(text.contains("agent_runs_total 1\n"));
    assert!(text.contains("agent_auto_send_total 1\n"));
    assert!(text.contains("agent_latency_ms_count 1\n"));
}

#[tokio::test]
async fn test_review_workflow() {
    let server = MockServer::start_async().await;
    mock_classification(&server, "account_access", "P1", 0.95).await;
    let app = spawn_app(&server).await;

    let body: Value = post_ticket(
        &app,
        json!({
            "subject": "Cannot log in",
            "body": "Locked out since yesterday",
            "customer_email": "sam@example.com",
            "channel": "email"
        }),
    )
    .await
    .json()
    .await
    .unwrap();
    assert_eq!(body["agent_run"]["decision"], "human_review");
    assert_eq!(body["review"]["status"], "pending");
    let review_id = body["review"]["id"].as_i64().unwrap();

    let pending: Value = app
        .client
        .get(app.url("/reviews?limit=10"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(pending.as_array().unwrap().len(), 1);
    assert_eq!(pending[0]["id"], review_id);

    let approved = app
        .client
        .post(app.url(&format!("/reviews/{}/approve", review_id)))
        .query(&[("final_reply", "We have reset your password.")])
        .send()
        .await
        .unwrap();
    assert_eq!(approved.status(), 200);
    let approved: Value = approved.json().await.unwrap();
    assert_eq!(approved["status"], "approved");
    assert_eq!(approved["final_reply"], "We have reset your password.");

    let pending: Value = app
        .client
        .get(app.url("/reviews"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(pending.as_array().unwrap().is_empty());

    let rejected: Value = app
        .client
        .post(app.url(&format!("/reviews/{}/reject", review_id)))
        .query(&[("reviewer_notes", "Needs identity check first")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rejected["status"], "rejected");
    assert_eq!(rejected["reviewer_notes"], "Needs identity check first");

    let metrics = app.client.get(app.url("/metrics")).send().await.unwrap().text().await.unwrap();
    assert!(metrics.contains("agent_human_review_total 1\n"));
}

#[tokio::test]
async fn test_p0_ticket_escalates_and_queues_review() {
    let server = MockServer::start_async().await;
    mock_classification(&server, "account_access", "P0", 0.99).await;
    let app = spawn_app(&server).await;

    let body: Value = post_ticket(
        &app,
        json!({"subject": "Account hacked", "body": "Someone changed my password"}),
    )
    .await
    .json()
    .await
    .unwrap();

    assert_eq!(body["agent_run"]["decision"], "escalate");
    assert_eq!(body["review"]["status"], "pending");

    let metrics = app.client.get(app.url("/metrics")).send().await.unwrap().text().await.unwrap();
    assert!(metrics.contains("agent_escalate_total 1\n"));
}

#[tokio::test]
async fn test_not_found_and_validation_errors() {
    let server = MockServer::start_async().await;
    let app = spawn_app(&server).await;

    let missing = app.client.get(app.url("/tickets/999")).send().await.unwrap();
    assert_eq!(missing.status(), 404);
    assert_eq!(
        missing.json::<Value>().await.unwrap(),
        json!({"detail": "Ticket not found"})
    );

    let missing_review = app
        .client
        .post(app.url("/reviews/999/approve"))
        .query(&[("final_reply", "x")])
        .send()
        .await
        .unwrap();
    assert_eq!(missing_review.status(), 404);
    assert_eq!(
        missing_review.json::<Value>().await.unwrap()["detail"],
        "Review not found"
    );

    let no_param = app
        .client
        .post(app.url("/reviews/1/reject"))
        .send()
        .await
        .unwrap();
    assert_eq!(no_param.status(), 422);

    let empty_subject = post_ticket(&app, json!({"subject": "", "body": "x"})).await;
    assert_eq!(empty_subject.status(), 422);
    let detail: Value = empty_subject.json().await.unwrap();
    assert!(detail["detail"].as_str().unwrap().contains("subject"));

    let bad_email =
        post_ticket(&app, json!({"subject": "Hi", "body": "x", "customer_email": "nope"})).await;
    assert_eq!(bad_email.status(), 422);

    let missing_body = post_ticket(&app, json!({"subject": "Hi"})).await;
    assert_eq!(missing_body.status(), 422);

    // 驗證失敗不計入 tickets_total
    let metrics = app.client.get(app.url("/metrics")).send().await.unwrap().text().await.unwrap();
    assert!(metrics.contains("tickets_total 0\n"));
}

#[tokio::test]
async fn test_llm_failure_returns_bad_gateway() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(500).body("boom");
        })
        .await;
    let app = spawn_app(&server).await;

    let response = post_ticket(&app, json!({"subject": "Help", "body": "Broken"})).await;
    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert!(body["detail"].is_string());
}
