//! End-to-end decomposition session tests
//!
//! Runs a full check/lock/compute/advance session against a mock solver,
//! exercising the HTTP client and the SSE progress stream together.

use std::sync::Arc;

use relnorm_client::{
    CheckOutcome, ComputeOutcome, HttpSolverClient, NormalizationDriver, SolverConfig,
    SseProgressSource, UndoOutcome,
};
use relnorm_core::{format_fd_list, parse_fd_list};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn base_rows() -> Vec<Vec<String>> {
    vec![
        vec!["a".to_string(), "x".to_string(), "1".to_string()],
        vec!["a".to_string(), "x".to_string(), "2".to_string()],
        vec!["b".to_string(), "y".to_string(), "1".to_string()],
    ]
}

fn driver_for(server: &MockServer) -> NormalizationDriver {
    let config = SolverConfig::new(server.uri()).with_computation_id("it-session");
    let client = HttpSolverClient::new(config.clone()).expect("client");
    let progress = SseProgressSource::for_config(&config);
    NormalizationDriver::new(
        config,
        Arc::new(client),
        Arc::new(progress),
        vec![0, 1, 2],
        base_rows(),
        parse_fd_list("1->2"),
    )
}

async fn mount_accepting_verdict(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/normalize/decompose-all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ljPreserved": true,
            "dpPreserved": true,
            "tableResults": [
                { "projectedFDs": ["1->2"] },
                { "projectedFDs": [] }
            ]
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn full_session_check_compute_and_advance() {
    let server = MockServer::start().await;
    mount_accepting_verdict(&server).await;

    Mock::given(method("POST"))
        .and(path("/normalize/decompose-stream/start"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "token": "it-tok" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let sse_body = concat!(
        "event: progress\n",
        "data: {\"message\":\"Projecting FDs onto 2 tables\"}\n\n",
        "event: progress\n",
        "data: {\"message\":\"Computing RIC matrices\"}\n\n",
        "event: complete\n",
        "data: {\"status\":\"done\",\"payload\":{",
        "\"ljPreserved\":true,",
        "\"globalRic\":[[1.0,1.0,1.0],[1.0,1.0,1.0],[1.0,1.0,1.0]],",
        "\"unionCols\":[0,1,2],",
        "\"tableResults\":[{\"ric\":[[1.0,0.5],[1.0,1.0]]},",
        "{\"ric\":[[1.0,1.0],[1.0,1.0],[1.0,1.0]]}],",
        "\"bcnfdecomposition\":false}}\n\n",
    );
    Mock::given(method("GET"))
        .and(path("/normalize/decompose-stream"))
        .and(query_param("token", "it-tok"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body.as_bytes().to_vec(), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/normalize/decompose"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "projectedFDs": ["1->2"]
        })))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/normalize/continue"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/normalization"))
        .expect(1)
        .mount(&server)
        .await;

    let mut driver = driver_for(&server);
    let first = driver
        .state_mut()
        .add_table_with_columns(vec![0, 1])
        .expect("first table");
    let second = driver
        .state_mut()
        .add_table_with_columns(vec![1, 2])
        .expect("second table");

    // Check: solver accepts, the layout locks, FDs get annotated.
    let outcome = driver.check_and_lock().await.expect("check");
    match outcome {
        CheckOutcome::Locked {
            dp_preserved,
            missing_fds,
            warnings,
        } => {
            assert!(dp_preserved);
            assert!(missing_fds.is_empty());
            assert!(warnings.is_empty());
        }
        other => panic!("expected Locked, got {other:?}"),
    }
    assert!(driver.state().is_locked());
    assert_eq!(
        format_fd_list(driver.state().table(first).expect("table").fds_local()),
        "1->2"
    );

    // Compute: stream to completion, then annotate RIC per table.
    let outcome = driver.compute_all_ric().await.expect("compute");
    assert!(matches!(outcome, ComputeOutcome::ContinueNormalization));
    assert_eq!(
        driver.progress_log(),
        &["Projecting FDs onto 2 tables", "Computing RIC matrices"]
    );
    assert_eq!(
        driver.state().table(first).expect("table").ric(),
        Some(&vec![vec![1.0, 0.5], vec![1.0, 1.0]])
    );
    assert_eq!(
        driver.state().table(second).expect("table").ric(),
        Some(&vec![vec![1.0, 1.0]; 3])
    );
    assert_eq!(driver.global_ric().map(Vec::len), Some(3));
    assert!(!driver.compute_in_progress());

    // Advance: the server acknowledges with a redirect; attempts reset.
    assert_eq!(driver.session().attempts(), 1);
    let target = driver.advance_stage().await.expect("advance");
    assert_eq!(target.as_deref(), Some("/normalization"));
    assert_eq!(driver.session().attempts(), 0);

    // Undo still works after locking: back to the pre-check layout.
    assert_eq!(driver.undo(), UndoOutcome::Restored);
    assert!(!driver.state().is_locked());
    assert_eq!(
        driver.state().column_sets(),
        vec![vec![0, 1], vec![1, 2]]
    );
}

#[tokio::test]
async fn lossy_verdict_keeps_layout_editable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/normalize/decompose-all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ljPreserved": false,
            "ljDetails": [
                { "isLossless": false, "explanation": "Join introduces spurious tuples" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut driver = driver_for(&server);
    driver
        .state_mut()
        .add_table_with_columns(vec![0, 1])
        .expect("first table");
    driver
        .state_mut()
        .add_table_with_columns(vec![1, 2])
        .expect("second table");

    let outcome = driver.check_and_lock().await.expect("check");
    match outcome {
        CheckOutcome::NotLossless { explanation, .. } => {
            assert_eq!(
                explanation.as_deref(),
                Some("Join introduces spurious tuples")
            );
        }
        other => panic!("expected NotLossless, got {other:?}"),
    }
    assert!(!driver.state().is_locked());
    assert!(driver.history().is_empty());
    // The failed check still burned an attempt.
    assert_eq!(driver.session().attempts(), 1);
}

#[tokio::test]
async fn stream_error_fails_compute_but_keeps_lock() {
    let server = MockServer::start().await;
    mount_accepting_verdict(&server).await;

    Mock::given(method("POST"))
        .and(path("/normalize/decompose-stream/start"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "token": "it-tok" })),
        )
        .mount(&server)
        .await;

    let sse_body = concat!(
        "event: progress\n",
        "data: {\"message\":\"Projecting FDs onto 2 tables\"}\n\n",
        "event: stream-error\n",
        "data: {\"message\":\"Solver ran out of time\"}\n\n",
    );
    Mock::given(method("GET"))
        .and(path("/normalize/decompose-stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body.as_bytes().to_vec(), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let mut driver = driver_for(&server);
    driver
        .state_mut()
        .add_table_with_columns(vec![0, 1])
        .expect("first table");
    driver
        .state_mut()
        .add_table_with_columns(vec![1, 2])
        .expect("second table");
    driver.check_and_lock().await.expect("check");

    let error = driver.compute_all_ric().await.expect_err("stream failure");
    assert_eq!(
        error.to_string(),
        "Progress stream error: Solver ran out of time"
    );
    // The lock survives a failed pass; the group can retry.
    assert!(driver.state().is_locked());
    assert!(!driver.compute_in_progress());
    assert_eq!(driver.progress_log(), &["Projecting FDs onto 2 tables"]);
}
