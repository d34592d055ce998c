use std::io::Write;
use std::time::Duration;

use airq_core::{ClientView, FailureKind, ItemStatus, JobKind, JobState, Outcome};
use airq_engine::{ClientConfig, ClientError, JobClient, TransportMode};
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn backend() -> MockServer {
    engine_logging::initialize_for_tests();
    let server = MockServer::start().await;
    for (route, body) in [
        ("/api/v1/data", serde_json::json!({ "data": [{ "pm10": 40 }, { "pm10": 42 }] })),
        (
            "/api/v1/data/info",
            serde_json::json!({ "totalData": 2, "outlierClear": true, "nanClear": true }),
        ),
        ("/api/v1/data/outliers", serde_json::json!([])),
        ("/api/v1/forecast/pm10/advanced", serde_json::json!([{ "day": 1 }])),
    ] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
    }
    server
}

fn client_for(server: &MockServer, mode: TransportMode) -> JobClient {
    let config = ClientConfig {
        base_url: format!("{}/api/v1", server.uri()),
        transport_mode: mode,
        pollutants: vec!["pm10".to_string()],
        poll_interval: Duration::from_millis(10),
        display_delay: Duration::from_secs(30),
        ..ClientConfig::default()
    };
    JobClient::new(config).expect("client")
}

async fn settle(client: &JobClient, ready: impl FnMut(&ClientView) -> bool) -> ClientView {
    tokio::time::timeout(Duration::from_secs(5), client.wait_for(ready))
        .await
        .expect("timed out waiting for client state")
        .expect("client closed")
}

#[tokio::test]
async fn advanced_stream_job_runs_to_completion() {
    let server = backend().await;
    let body = [
        r#"{"status":"start","message":"Starting advanced forecast"}"#,
        r#"{"status":"processing","pollutant":"pm10","progress":25}"#,
        r#"{"status":"done","pollutant":"pm10","progress":50}"#,
        r#"{"status":"processing","pollutant":"PM25","progress":75}"#,
        r#"{"status":"done","pollutant":"pm25","progress":100}"#,
        r#"{"status":"complete"}"#,
    ]
    .iter()
    .map(|event| format!("data: {event}\n\n"))
    .collect::<String>();
    Mock::given(method("GET"))
        .and(path("/api/v1/model/process-advanced"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, TransportMode::Stream);
    let job_id = client.start(JobKind::Advanced).await.unwrap();

    let view = settle(&client, |view| view.state == JobState::Completed).await;
    let job = view.job.unwrap();
    let names: Vec<_> = job.items.iter().map(|item| item.name.as_str()).collect();
    assert_eq!(names, vec!["pm10", "pm25"]);
    assert!(job.items.iter().all(|item| item.status == ItemStatus::Done));
    assert_eq!(job.overall_percent, 100);
    assert_eq!(
        view.notice.unwrap().message,
        "All advanced forecasts completed."
    );

    let view = settle(&client, |view| view.reconciled_for == Some(job_id)).await;
    let server_state = view.server.unwrap();
    assert_eq!(server_state.dataset_rows, 2);
    assert!(server_state.availability.advanced);
    assert!(!server_state.availability.basic);
}

#[tokio::test]
async fn polled_job_reports_estimates_then_completes() {
    let server = backend().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/model/process-advanced/start"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/model/process-advanced/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "start" })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/model/process-advanced/status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "status": "complete", "message": "Done" })),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, TransportMode::Poll);
    client.start(JobKind::Advanced).await.unwrap();

    let view = settle(&client, |view| view.state == JobState::Completed).await;
    let job = view.job.unwrap();
    assert_eq!(job.overall_percent, 100);
    assert!(!job.overall_estimated);
    assert_eq!(view.notice.unwrap().message, "Done");
}

#[tokio::test]
async fn basic_job_failure_surfaces_backend_message() {
    let server = backend().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/model/process-basic"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(serde_json::json!({ "error": "Upload a dataset first" })),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, TransportMode::Stream);
    let mut notices = client.notices();
    client.start(JobKind::Basic).await.unwrap();

    let notice = notices.recv().await.unwrap();
    assert_eq!(notice.outcome, Outcome::Failed);
    assert_eq!(notice.message, "Upload a dataset first");
    assert_eq!(client.view().state, JobState::Failed);
}

#[tokio::test]
async fn upload_then_refresh() {
    let server = backend().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/upload-csv"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "message": "File uploaded successfully" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("readings.csv");
    let mut file = std::fs::File::create(&file_path).unwrap();
    writeln!(file, "date,pm10\n2024-01-01,40\n2024-01-02,42").unwrap();
    drop(file);

    let client = client_for(&server, TransportMode::Stream);
    let err = client.upload(dir.path().join("readings.txt")).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidInput(_)));

    let upload_id = client.upload(&file_path).await.unwrap();
    let view = settle(&client, |view| view.reconciled_for == Some(upload_id)).await;
    assert_eq!(view.state, JobState::Idle);
    assert_eq!(view.upload.unwrap().percent, 100);
    assert_eq!(view.notice.unwrap().message, "File uploaded successfully");
    assert_eq!(view.server.unwrap().dataset_rows, 2);
}

#[tokio::test]
async fn unanswered_basic_job_fails_after_its_timeout() {
    let server = backend().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/model/process-basic"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "message": "late" }))
                .set_delay(Duration::from_secs(20)),
        )
        .mount(&server)
        .await;

    let config = ClientConfig {
        base_url: format!("{}/api/v1", server.uri()),
        pollutants: vec!["pm10".to_string()],
        stall_timeout: Duration::from_millis(200),
        basic_timeout: Duration::from_millis(300),
        display_delay: Duration::from_secs(30),
        ..ClientConfig::default()
    };
    let client = JobClient::new(config).expect("client");
    client.start(JobKind::Basic).await.unwrap();

    let view = settle(&client, |view| view.state == JobState::Failed).await;
    assert_eq!(
        view.job.unwrap().failure.unwrap().kind,
        FailureKind::Stalled
    );
}

#[test]
fn zero_poll_interval_is_rejected_up_front() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _guard = runtime.enter();
    let config = ClientConfig {
        transport_mode: TransportMode::Poll,
        poll_interval: Duration::ZERO,
        ..ClientConfig::default()
    };
    match JobClient::new(config) {
        Err(ClientError::InvalidInput(reason)) => assert!(reason.contains("poll_interval")),
        Err(other) => panic!("unexpected error {other:?}"),
        Ok(_) => panic!("zero poll interval accepted"),
    }
}

#[test]
fn invalid_base_url_is_rejected() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _guard = runtime.enter();
    let config = ClientConfig {
        base_url: "not a url".to_string(),
        ..ClientConfig::default()
    };
    assert!(matches!(
        JobClient::new(config),
        Err(ClientError::InvalidInput(_))
    ));
}
