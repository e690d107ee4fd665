// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! JobEngine and InventoryClient tests against a mock Mercury service.

use std::time::Duration;

use mercury_sdk::{
    JobRequest, JobState, JoinOptions, JoinOutcome, MercuryClient, Query, SdkConfig, SdkError,
    TargetDescriptor,
};
use serde_json::{Map, json};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> MercuryClient {
    MercuryClient::new(SdkConfig::new(server.uri()), None).unwrap()
}

async fn mount_submit(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/api/rpc/jobs"))
        .and(body_json(body))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"job_id": "j1", "targets": ["d1"]})),
        )
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_submit_sends_query_and_instruction() {
    let server = MockServer::start().await;
    mount_submit(
        &server,
        json!({
            "query": {"rack": "r12"},
            "instruction": {"method": "run", "args": ["uptime"], "kwargs": {"timeout": 5}}
        }),
    )
    .await;

    let mut query = Query::new();
    query.insert("rack", json!("r12"));

    let job = JobRequest::new(TargetDescriptor::Query(query), "run")
        .with_arg("uptime")
        .with_kwarg("timeout", 5)
        .submit(&client_for(&server).jobs())
        .await
        .unwrap();

    assert_eq!(job.job_id(), "j1");
    assert_eq!(job.state(), JobState::Submitted);
    assert_eq!(job.receipt().targets, json!(["d1"]));
}

#[tokio::test]
async fn test_submit_rejected_by_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/rpc/jobs"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "bad query"})))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server)
        .jobs()
        .submit(TargetDescriptor::device("d1"), "run", Vec::new(), Map::new())
        .await;

    let err = result.unwrap_err();
    let envelope = err.envelope().expect("server rejection carries an envelope");
    assert!(envelope.error);
    assert_eq!(envelope.code, 400);
    assert_eq!(envelope.data, json!({"message": "bad query"}));
    assert_eq!(err.exit_code(), 4);
}

#[tokio::test]
async fn test_submit_without_job_id_is_unexpected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/rpc/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"targets": []})))
        .mount(&server)
        .await;

    let result = client_for(&server)
        .jobs()
        .submit(TargetDescriptor::device("d1"), "run", Vec::new(), Map::new())
        .await;
    assert!(matches!(result, Err(SdkError::UnexpectedResponse(_))));
}

#[tokio::test]
async fn test_empty_method_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "j1"})))
        .expect(0)
        .mount(&server)
        .await;

    let result = client_for(&server)
        .jobs()
        .submit(TargetDescriptor::device("d1"), "", Vec::new(), Map::new())
        .await;
    assert!(matches!(result, Err(SdkError::Validation(_))));
}

#[tokio::test]
async fn test_join_and_tasks() {
    let server = MockServer::start().await;
    mount_submit(
        &server,
        json!({
            "query": {"mercury_id": "d1"},
            "instruction": {"method": "run", "args": ["hostname"], "kwargs": {}}
        }),
    )
    .await;

    // First poll reports running, later polls report completion.
    Mock::given(method("GET"))
        .and(path("/api/rpc/jobs/j1/status"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"job_id": "j1", "time_completed": null})),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/rpc/jobs/j1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "j1",
            "time_completed": 1735689600.0,
            "task_count": 1
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/rpc/jobs/j1/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tasks": [
                {"mercury_id": "d1", "time_completed": 1735689600.0,
                 "message": {"stdout": "d1.example\n", "stderr": ""}}
            ]
        })))
        .mount(&server)
        .await;

    let jobs = client_for(&server).jobs();
    let mut job = jobs
        .submit(
            TargetDescriptor::device("d1"),
            "run",
            vec![json!("hostname")],
            Map::new(),
        )
        .await
        .unwrap();

    let outcome = jobs
        .join(
            &mut job,
            JoinOptions::default().with_poll_interval(Duration::from_millis(10)),
        )
        .await
        .unwrap();

    match outcome {
        JoinOutcome::Completed(status) => {
            assert!(status.is_complete());
            assert_eq!(status.extra["task_count"], 1);
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert_eq!(job.state(), JobState::Completed);
    assert!(job.last_status().unwrap().is_complete());

    let tasks = jobs.tasks(&job).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].device_id(), "d1");
    assert_eq!(tasks[0].stdout(), Some("d1.example\n"));
    assert_eq!(tasks[0].stderr(), None);
    assert!(tasks[0].is_complete());
}

#[tokio::test]
async fn test_status_of_unknown_job() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/rpc/jobs/missing/status"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .jobs()
        .status_of("missing")
        .await
        .unwrap_err();
    assert_eq!(err.envelope().unwrap().code, 404);
}

#[tokio::test]
async fn test_inventory_query_and_get() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/inventory/computers/query"))
        .and(query_param("projection", "mercury_id,os"))
        .and(query_param("limit", "10"))
        .and(body_json(json!({"query": {"os": "linux"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"mercury_id": "d1", "os": "linux"}, {"mercury_id": "d2", "os": "linux"}],
            "total": 2
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/inventory/computers/d1"))
        .and(query_param("projection", "os"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"mercury_id": "d1", "os": "linux"})))
        .expect(1)
        .mount(&server)
        .await;

    let inventory = client_for(&server).inventory();
    let query = Query::parse(r#"{"os": "linux"}"#).unwrap();

    let page = inventory
        .query(&query, &["mercury_id", "os"], Some(10))
        .await
        .unwrap();
    assert_eq!(page.device_ids(), vec!["d1".to_string(), "d2".to_string()]);
    assert_eq!(page.extra["total"], 2);

    let record = inventory.get("d1", &["os"]).await.unwrap();
    assert_eq!(record["os"], "linux");
}

#[tokio::test]
async fn test_join_uses_configured_poll_interval() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/rpc/jobs/j7/status"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"job_id": "j7", "time_completed": null})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/rpc/jobs/j7/status"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"job_id": "j7", "time_completed": 1.0})),
        )
        .mount(&server)
        .await;

    let config = SdkConfig::new(server.uri()).with_poll_interval(Duration::from_millis(20));
    let jobs = MercuryClient::new(config, None).unwrap().jobs();

    // The 2 s default would overrun this bound.
    let outcome = tokio::time::timeout(
        Duration::from_secs(1),
        jobs.wait_for("j7", JoinOptions::default()),
    )
    .await
    .expect("configured poll interval is used")
    .unwrap();
    assert!(outcome.is_completed());
}

#[tokio::test]
async fn test_submit_embedded_error_is_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/rpc/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"error": true, "code": 500, "data": {"message": "queue unavailable"}}),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .jobs()
        .submit(TargetDescriptor::device("d1"), "run", Vec::new(), Map::new())
        .await
        .unwrap_err();

    assert_eq!(err.envelope().unwrap().code, 500);
    assert!(err.to_string().contains("queue unavailable"));
    assert_eq!(err.exit_code(), 4);
}

#[tokio::test]
async fn test_inventory_record_with_error_fields() {
    let server = MockServer::start().await;
    let record = json!({"mercury_id": "d1", "error": true, "code": 3});
    Mock::given(method("GET"))
        .and(path("/api/inventory/computers/d1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(record.clone()))
        .mount(&server)
        .await;

    let value = client_for(&server).inventory().get("d1", &[]).await.unwrap();
    assert_eq!(value, record);
}
