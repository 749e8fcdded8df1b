//! HTTP 통합 테스트
//!
//! wiremock으로 프로비저닝 서비스를 흉내 내고 실제 reqwest 클라이언트로
//! 전체 라이프사이클(프로비저닝 → 시나리오 → 정리)을 검증합니다.
//! `expect(n)`은 MockServer drop 시점에 검증됩니다.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dbsmoke_core::types::{Dialect, Verdict};
use dbsmoke_harness::lifecycle::{EXIT_PROVISION_ERROR, EXIT_SCENARIO_ERROR};
use dbsmoke_harness::{
    CleanupStatus, ClientTimeouts, HttpProvisioningClient, LifecycleController, ResourceClient,
    RunOutcome, RunState,
};

// =============================================================================
// Helpers
// =============================================================================

fn new_db_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn controller(
    server: &MockServer,
    dialect: Dialect,
    timeouts: ClientTimeouts,
) -> LifecycleController<HttpProvisioningClient> {
    let api = HttpProvisioningClient::new(&server.uri()).expect("client should build");
    LifecycleController::new(ResourceClient::new(Arc::new(api), timeouts), dialect)
}

async fn mount_provision(server: &MockServer, dialect: Dialect, db_id: &str) {
    Mock::given(method("POST"))
        .and(path("/db/new"))
        .and(body_partial_json(json!({ "dialect": dialect.wire_name() })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "db_id": db_id,
            "dialect": dialect.wire_name(),
            "status": "running"
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_statement(
    server: &MockServer,
    db_id: &str,
    fragment: &str,
    response: ResponseTemplate,
    calls: u64,
) {
    Mock::given(method("POST"))
        .and(path(format!("/db/{db_id}/query")))
        .and(body_string_contains(fragment))
        .respond_with(response)
        .expect(calls)
        .mount(server)
        .await;
}

async fn mount_destroy(server: &MockServer, db_id: &str, response: ResponseTemplate, calls: u64) {
    Mock::given(method("DELETE"))
        .and(path(format!("/db/{db_id}")))
        .respond_with(response)
        .expect(calls)
        .mount(server)
        .await;
}

fn destroyed(db_id: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "db_id": db_id, "status": "destroyed" }))
}

fn users_rows(count: usize) -> ResponseTemplate {
    let names = ["Alice", "Bob", "Charlie", "Dave", "Eve"];
    let rows: Vec<_> = (0..count)
        .map(|i| {
            let name = names[i % names.len()];
            json!([i + 1, name, format!("{}@example.com", name.to_lowercase())])
        })
        .collect();
    if rows.is_empty() {
        // 서비스는 행이 없으면 columns/rows를 생략합니다.
        return ResponseTemplate::new(200).set_body_json(json!({}));
    }
    ResponseTemplate::new(200).set_body_json(json!({
        "columns": ["id", "name", "email"],
        "rows": rows
    }))
}

/// 정상 시나리오 응답을 모두 등록합니다.
async fn mount_happy_scenario(server: &MockServer, db_id: &str, select_rows: usize) {
    mount_statement(
        server,
        db_id,
        "CREATE TABLE users",
        ResponseTemplate::new(200).set_body_json(json!({})),
        1,
    )
    .await;
    mount_statement(
        server,
        db_id,
        "INSERT INTO users",
        ResponseTemplate::new(200).set_body_json(json!({ "affected_rows": 3 })),
        1,
    )
    .await;
    mount_statement(
        server,
        db_id,
        "SELECT id, name, email FROM users ORDER BY id",
        users_rows(select_rows),
        1,
    )
    .await;
}

// =============================================================================
// Passing runs
// =============================================================================

#[tokio::test]
async fn mysql_run_passes_end_to_end() {
    let server = MockServer::start().await;
    let db_id = new_db_id();
    mount_provision(&server, Dialect::Mysql, &db_id).await;
    mount_happy_scenario(&server, &db_id, 3).await;
    mount_destroy(&server, &db_id, destroyed(&db_id), 1).await;

    let report = controller(&server, Dialect::Mysql, ClientTimeouts::default())
        .run()
        .await;

    assert_eq!(report.verdict(), Some(Verdict::Passed));
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.cleanup, CleanupStatus::Destroyed);
    assert_eq!(report.db_id.as_deref(), Some(db_id.as_str()));

    let selected = report.selected.expect("select result should be kept");
    assert_eq!(selected.columns, vec!["id", "name", "email"]);
    assert_eq!(selected.rows[0], vec![json!(1), json!("Alice"), json!("alice@example.com")]);
    assert_eq!(selected.rows[2][1], json!("Charlie"));

    let labels: Vec<_> = report.timings.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(
        labels,
        vec!["provision", "create_table", "insert_rows", "select_rows", "destroy"]
    );
}

#[tokio::test]
async fn mssql_run_sends_mssql_ddl_and_passes() {
    let server = MockServer::start().await;
    let db_id = new_db_id();
    mount_provision(&server, Dialect::Mssql, &db_id).await;
    // MSSQL 전용 타입이 실제로 전송되는지 확인
    mount_statement(
        &server,
        &db_id,
        "INT IDENTITY(1,1) PRIMARY KEY",
        ResponseTemplate::new(200).set_body_json(json!({})),
        1,
    )
    .await;
    mount_statement(
        &server,
        &db_id,
        "INSERT INTO users",
        ResponseTemplate::new(200).set_body_json(json!({ "affected_rows": 3 })),
        1,
    )
    .await;
    mount_statement(&server, &db_id, "SELECT id, name, email", users_rows(3), 1).await;
    mount_destroy(&server, &db_id, destroyed(&db_id), 1).await;

    let report = controller(&server, Dialect::Mssql, ClientTimeouts::default())
        .run()
        .await;

    assert_eq!(report.verdict(), Some(Verdict::Passed));
    assert_eq!(report.exit_code(), 0);
}

// =============================================================================
// Verification failures
// =============================================================================

#[tokio::test]
async fn row_count_mismatch_fails_for_every_dialect() {
    for (dialect, rows) in [(Dialect::Mysql, 2), (Dialect::Mssql, 0)] {
        let server = MockServer::start().await;
        let db_id = new_db_id();
        mount_provision(&server, dialect, &db_id).await;
        mount_happy_scenario(&server, &db_id, rows).await;
        mount_destroy(&server, &db_id, destroyed(&db_id), 1).await;

        let report = controller(&server, dialect, ClientTimeouts::default())
            .run()
            .await;

        assert_eq!(report.verdict(), Some(Verdict::Failed), "{dialect}");
        assert_eq!(report.exit_code(), 1);
        match report.outcome {
            RunOutcome::Verified {
                expected_rows,
                actual_rows,
                ..
            } => {
                assert_eq!(expected_rows, 3);
                assert_eq!(actual_rows, rows);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}

// =============================================================================
// Provisioning failures
// =============================================================================

#[tokio::test]
async fn provision_error_body_is_reported_and_nothing_is_destroyed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/db/new"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": {
                "code": "DOCKER_UNAVAILABLE",
                "message": "Docker daemon is not reachable"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let report = controller(&server, Dialect::Mysql, ClientTimeouts::default())
        .run()
        .await;

    assert_eq!(report.exit_code(), EXIT_PROVISION_ERROR);
    assert_eq!(report.cleanup, CleanupStatus::NotNeeded);
    match &report.outcome {
        RunOutcome::ProvisionFailed { error } => {
            assert!(error.contains("503"));
            assert!(error.contains("DOCKER_UNAVAILABLE"));
            assert!(error.contains("mysql"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(
        report.states,
        vec![RunState::Init, RunState::Errored, RunState::Done]
    );
}

#[tokio::test]
async fn provision_response_without_db_id_is_provision_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/db/new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "starting" })))
        .expect(1)
        .mount(&server)
        .await;

    let report = controller(&server, Dialect::Mssql, ClientTimeouts::default())
        .run()
        .await;

    assert_eq!(report.exit_code(), EXIT_PROVISION_ERROR);
    match &report.outcome {
        RunOutcome::ProvisionFailed { error } => assert!(error.contains("missing db_id")),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn provision_non_json_body_is_provision_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/db/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let report = controller(&server, Dialect::Mysql, ClientTimeouts::default())
        .run()
        .await;

    assert!(matches!(report.outcome, RunOutcome::ProvisionFailed { .. }));
}

// =============================================================================
// Scenario failures
// =============================================================================

#[tokio::test]
async fn sql_error_in_ok_body_fails_step_and_still_destroys() {
    let server = MockServer::start().await;
    let db_id = new_db_id();
    mount_provision(&server, Dialect::Mysql, &db_id).await;
    mount_statement(
        &server,
        &db_id,
        "CREATE TABLE users",
        ResponseTemplate::new(200).set_body_json(json!({
            "error": "ERROR 1050 (42S01): Table 'users' already exists"
        })),
        1,
    )
    .await;
    mount_statement(&server, &db_id, "INSERT INTO users", users_rows(0), 0).await;
    mount_destroy(&server, &db_id, destroyed(&db_id), 1).await;

    let report = controller(&server, Dialect::Mysql, ClientTimeouts::default())
        .run()
        .await;

    assert_eq!(report.exit_code(), EXIT_SCENARIO_ERROR);
    assert_eq!(report.cleanup, CleanupStatus::Destroyed);
    match &report.outcome {
        RunOutcome::ScenarioFailed { step, error } => {
            assert_eq!(step.as_deref(), Some("create_table"));
            assert!(error.contains("already exists"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn query_http_error_fails_step_and_still_destroys() {
    let server = MockServer::start().await;
    let db_id = new_db_id();
    mount_provision(&server, Dialect::Mssql, &db_id).await;
    mount_statement(
        &server,
        &db_id,
        "CREATE TABLE users",
        ResponseTemplate::new(200).set_body_json(json!({})),
        1,
    )
    .await;
    mount_statement(
        &server,
        &db_id,
        "INSERT INTO users",
        ResponseTemplate::new(500).set_body_json(json!({
            "error": {
                "code": "QUERY_FAILED",
                "message": "Query execution failed",
                "detail": "sqlcmd exited with status 1"
            }
        })),
        1,
    )
    .await;
    mount_destroy(&server, &db_id, destroyed(&db_id), 1).await;

    let report = controller(&server, Dialect::Mssql, ClientTimeouts::default())
        .run()
        .await;

    assert_eq!(report.exit_code(), EXIT_SCENARIO_ERROR);
    match &report.outcome {
        RunOutcome::ScenarioFailed { step, error } => {
            assert_eq!(step.as_deref(), Some("insert_rows"));
            assert!(error.contains("QUERY_FAILED"));
            assert!(error.contains("sqlcmd exited with status 1"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn ragged_rows_are_a_query_error() {
    let server = MockServer::start().await;
    let db_id = new_db_id();
    mount_provision(&server, Dialect::Mysql, &db_id).await;
    mount_statement(
        &server,
        &db_id,
        "CREATE TABLE users",
        ResponseTemplate::new(200).set_body_json(json!({})),
        1,
    )
    .await;
    mount_statement(
        &server,
        &db_id,
        "INSERT INTO users",
        ResponseTemplate::new(200).set_body_json(json!({ "affected_rows": 3 })),
        1,
    )
    .await;
    mount_statement(
        &server,
        &db_id,
        "SELECT id, name, email",
        ResponseTemplate::new(200).set_body_json(json!({
            "columns": ["id", "name", "email"],
            "rows": [[1, "Alice", "alice@example.com"], [2, "Bob"]]
        })),
        1,
    )
    .await;
    mount_destroy(&server, &db_id, destroyed(&db_id), 1).await;

    let report = controller(&server, Dialect::Mysql, ClientTimeouts::default())
        .run()
        .await;

    assert_eq!(report.exit_code(), EXIT_SCENARIO_ERROR);
    match &report.outcome {
        RunOutcome::ScenarioFailed { step, .. } => {
            assert_eq!(step.as_deref(), Some("select_rows"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn slow_query_times_out_and_still_destroys() {
    let server = MockServer::start().await;
    let db_id = new_db_id();
    mount_provision(&server, Dialect::Mysql, &db_id).await;
    mount_statement(
        &server,
        &db_id,
        "CREATE TABLE users",
        ResponseTemplate::new(200)
            .set_body_json(json!({}))
            .set_delay(Duration::from_secs(2)),
        1,
    )
    .await;
    mount_destroy(&server, &db_id, destroyed(&db_id), 1).await;

    let timeouts = ClientTimeouts {
        query: Duration::from_millis(200),
        ..ClientTimeouts::default()
    };
    let report = controller(&server, Dialect::Mysql, timeouts).run().await;

    assert_eq!(report.exit_code(), EXIT_SCENARIO_ERROR);
    assert_eq!(report.cleanup, CleanupStatus::Destroyed);
    match &report.outcome {
        RunOutcome::ScenarioFailed { error, .. } => assert!(error.contains("timed out")),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

// =============================================================================
// Cleanup failures
// =============================================================================

#[tokio::test]
async fn destroy_failure_keeps_passing_exit_code() {
    let server = MockServer::start().await;
    let db_id = new_db_id();
    mount_provision(&server, Dialect::Mysql, &db_id).await;
    mount_happy_scenario(&server, &db_id, 3).await;
    mount_destroy(
        &server,
        &db_id,
        ResponseTemplate::new(500).set_body_json(json!({
            "error": { "code": "INTERNAL_ERROR", "message": "container removal failed" }
        })),
        1,
    )
    .await;

    let report = controller(&server, Dialect::Mysql, ClientTimeouts::default())
        .run()
        .await;

    assert_eq!(report.verdict(), Some(Verdict::Passed));
    assert_eq!(report.exit_code(), 0);
    match &report.cleanup {
        CleanupStatus::Failed { reason } => assert!(reason.contains("container removal failed")),
        other => panic!("unexpected cleanup: {other:?}"),
    }
    assert_eq!(report.states.last(), Some(&RunState::Done));
}

// =============================================================================
// Health preflight
// =============================================================================

#[tokio::test]
async fn unhealthy_service_aborts_before_provisioning() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "unhealthy",
            "docker": "disconnected"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/db/new"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let report = controller(&server, Dialect::Mssql, ClientTimeouts::default())
        .with_preflight(true)
        .run()
        .await;

    assert_eq!(report.exit_code(), EXIT_PROVISION_ERROR);
    assert!(matches!(report.outcome, RunOutcome::PreflightFailed { .. }));
}

#[tokio::test]
async fn health_endpoint_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "healthy",
            "docker": "connected"
        })))
        .mount(&server)
        .await;

    let api = HttpProvisioningClient::new(&server.uri()).unwrap();
    let client = ResourceClient::new(Arc::new(api), ClientTimeouts::default());
    let report = client.health().await.value.unwrap();

    assert!(report.is_healthy());
    assert_eq!(report.docker.as_deref(), Some("connected"));
}

#[tokio::test]
async fn unreachable_service_is_provision_error() {
    // 바인딩 후 바로 닫아 연결 거부가 나는 주소를 만듭니다.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = HttpProvisioningClient::new(&format!("http://{addr}")).unwrap();
    let report = LifecycleController::new(
        ResourceClient::new(Arc::new(api), ClientTimeouts::default()),
        Dialect::Mysql,
    )
    .run()
    .await;

    assert_eq!(report.exit_code(), EXIT_PROVISION_ERROR);
    assert_eq!(report.cleanup, CleanupStatus::NotNeeded);
}
