//! End-to-end provisioning and traffic tests against a mock guard.

use serde_json::json;
use spendguard_client::{
    BudgetSpec, ClientError, GuardClient, GuardConfig, ProvisioningPlan, ProvisioningWorkflow,
    RunMode, TrafficGenerator, TrafficPlan, WorkflowStep,
};
use spendguard_core::logging::init_test_logging;
use std::time::Duration;
use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

async fn mount_healthy(server: &MockServer) {
    Mock::given(matchers::method("GET"))
        .and(matchers::path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(server)
        .await;
}

async fn mount_agent_and_budget(server: &MockServer) {
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1/agents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"agent_id": "agent-42"})))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1/agents/agent-42/budget"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "agent_id": "agent-42",
            "hard_limit_cents": 500,
            "remaining_cents": 500
        })))
        .expect(1)
        .mount(server)
        .await;
}

fn client_for(server: &MockServer) -> GuardClient {
    init_test_logging();
    GuardClient::new(&GuardConfig::default().with_base_url(server.uri())).unwrap()
}

#[tokio::test]
async fn test_zero_hard_limit_is_rejected_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(matchers::any())
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let err = BudgetSpec::new(0, None).unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_degraded_health_creates_nothing() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("GET"))
        .and(matchers::path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "degraded"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1/agents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"agent_id": "x"})))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let plan = ProvisioningPlan::new("audit", BudgetSpec::new(500, None).unwrap());
    let err = ProvisioningWorkflow::new(&client, plan)
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.step, WorkflowStep::HealthCheck);
    assert!(err.source.is_schema());
    assert!(err.agent_id.is_none());
}

#[tokio::test]
async fn test_bootstrap_with_run() {
    let server = MockServer::start().await;
    mount_healthy(&server).await;
    mount_agent_and_budget(&server).await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1/agents/agent-42/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"run_id": "run-7"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let plan = ProvisioningPlan::new("audit", BudgetSpec::new(500, None).unwrap()).with_run(true);
    let done = ProvisioningWorkflow::new(&client, plan).run().await.unwrap();

    assert_eq!(done.agent_id, "agent-42");
    assert_eq!(done.budget.remaining_cents, Some(500));
    assert_eq!(done.run.unwrap().run_id, "run-7");

    let paths: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect();
    assert_eq!(
        paths,
        vec![
            "/health",
            "/v1/agents",
            "/v1/agents/agent-42/budget",
            "/v1/agents/agent-42/runs"
        ]
    );
}

#[tokio::test]
async fn test_budget_failure_reports_created_agent() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1/agents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"agent_id": "agent-9"})))
        .mount(&server)
        .await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1/agents/agent-9/budget"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"detail": "hard_limit_cents too large"})),
        )
        .mount(&server)
        .await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1/agents/agent-9/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"run_id": "r"})))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let plan = ProvisioningPlan::new("audit", BudgetSpec::new(500, None).unwrap())
        .with_health_check(false)
        .with_run(true);
    let err = ProvisioningWorkflow::new(&client, plan)
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.step, WorkflowStep::SetBudget);
    assert_eq!(err.agent_id.as_deref(), Some("agent-9"));
    assert!(matches!(err.source, ClientError::Http { status: 422, .. }));
    assert!(err.to_string().contains("hard_limit_cents too large"));
}

#[tokio::test]
async fn test_traffic_shared_run() {
    let server = MockServer::start().await;
    mount_healthy(&server).await;
    mount_agent_and_budget(&server).await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1/agents/agent-42/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"run_id": "run-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1/agents/agent-42/runs/run-1/openai/responses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "resp"})))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let plan = TrafficPlan::new("traffic", BudgetSpec::new(500, None).unwrap())
        .with_requests(3)
        .with_delay(Duration::from_millis(5));
    let report = TrafficGenerator::new(&client, plan)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.requests_sent, 3);
    assert_eq!(report.run_ids, vec!["run-1", "run-1", "run-1"]);
    assert!(report.window.start <= report.window.end);
    assert!(report.reconcile_hint().contains(&report.window.start_iso()));
}

#[tokio::test]
async fn test_traffic_run_per_request() {
    let server = MockServer::start().await;
    mount_healthy(&server).await;
    mount_agent_and_budget(&server).await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1/agents/agent-42/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"run_id": "run-n"})))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1/agents/agent-42/runs/run-n/openai/responses"))
        .and(matchers::body_partial_json(json!({"max_output_tokens": 16})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "resp"})))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let plan = TrafficPlan::new("traffic", BudgetSpec::new(500, None).unwrap())
        .with_requests(2)
        .with_max_output_tokens(16)
        .with_run_mode(RunMode::PerRequest);
    let report = TrafficGenerator::new(&client, plan)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.run_ids.len(), 2);
}

#[tokio::test]
async fn test_traffic_stops_at_first_failed_request() {
    let server = MockServer::start().await;
    mount_healthy(&server).await;
    mount_agent_and_budget(&server).await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1/agents/agent-42/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"run_id": "run-1"})))
        .mount(&server)
        .await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1/agents/agent-42/runs/run-1/openai/responses"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({"detail": "budget exceeded"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let plan = TrafficPlan::new("traffic", BudgetSpec::new(500, None).unwrap()).with_requests(5);
    let err = TrafficGenerator::new(&client, plan)
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.step, WorkflowStep::MeteredRequest { sequence: 1 });
    assert_eq!(err.agent_id.as_deref(), Some("agent-42"));
    assert!(err.source.to_string().contains("budget exceeded"));
}

#[tokio::test]
async fn test_invalid_traffic_plan_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let plan = TrafficPlan::new("traffic", BudgetSpec::new(500, None).unwrap()).with_requests(0);
    let err = TrafficGenerator::new(&client, plan).err().unwrap();
    assert!(err.is_validation());
}
