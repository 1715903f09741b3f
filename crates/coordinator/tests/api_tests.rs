use axum::body::Body;
use axum::http::{Request, StatusCode};
use coordinator::api::{self, SubmitJobResponse};
use coordinator::config::ServiceParams;
use coordinator::service::NodeStatus;
use coordinator::setup_test_node;
use hashwork_core::ids::PeerId;
use hashwork_core::job::Skills;
use http_body_util::BodyExt;
use tower::ServiceExt;
use transport::PeerHandle;

fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_check() {
    let state = setup_test_node(ServiceParams::default()).await;
    let app = api::router(state);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn submit_without_workers_is_unavailable() {
    let state = setup_test_node(ServiceParams::default()).await;
    let app = api::router(state);

    let response = app
        .oneshot(json_request("POST", "/jobs", r#"{"data": "0x1234", "difficulty": 4}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn submit_with_bad_hex_is_rejected() {
    let state = setup_test_node(ServiceParams::default()).await;
    let app = api::router(state);

    let response = app
        .oneshot(json_request("POST", "/jobs", r#"{"data": "zz", "difficulty": 4}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn submit_to_registered_worker_returns_id() {
    let state = setup_test_node(ServiceParams::default()).await;
    let (peer, mut rx) = PeerHandle::channel(PeerId([0x77; 32]));
    state
        .coordinator
        .handle_message(&peer, Skills { difficulty: 16, max_payload_size: 0 }.into())
        .unwrap();

    let app = api::router(state.clone());
    let response = app
        .oneshot(json_request("POST", "/jobs", r#"{"data": "0xdeadbeef", "difficulty": 8}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let resp: SubmitJobResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(resp.job_id.len(), 16);

    match rx.recv().await.unwrap() {
        hashwork_core::enums::ProtocolMessage::Request(req) => {
            assert_eq!(req.id.to_string(), resp.job_id);
            assert_eq!(req.data, vec![0xde, 0xad, 0xbe, 0xef]);
        }
        other => panic!("expected Request, got {:?}", other),
    }
    assert_eq!(state.coordinator.submits().len(), 1);
}

#[tokio::test]
async fn set_difficulty_is_reflected_in_status() {
    let state = setup_test_node(ServiceParams::default()).await;

    let response = api::router(state.clone())
        .oneshot(json_request("PUT", "/difficulty", r#"{"difficulty": 0}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = api::router(state.clone())
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let status: NodeStatus = serde_json::from_slice(&body).unwrap();
    assert_eq!(status.max_difficulty, 0);
    assert!(!status.worker);
    assert_eq!(status.node_id, state.node.local_id().to_string());
}

#[tokio::test]
async fn stop_shuts_the_node_down() {
    let state = setup_test_node(ServiceParams::default()).await;

    let response = api::router(state.clone())
        .oneshot(json_request("POST", "/stop", ""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    assert!(state.coordinator.is_stopped());
    tokio::time::timeout(std::time::Duration::from_secs(2), state.coordinator.wait())
        .await
        .expect("node did not stop");
}
