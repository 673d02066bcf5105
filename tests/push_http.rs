use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use checkvisor::push::{self, router};
use checkvisor::{
    BackendError, BackendFn, Check, Config, PushError, PushRegistry, ReportedState, RunParams,
    Runtime, State, StatusUpdate,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn status_of(registry: &Arc<PushRegistry>, req: Request<Body>) -> StatusCode {
    router(Arc::clone(registry))
        .oneshot(req)
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn rejects_wrong_method_and_path() {
    let registry = Arc::new(PushRegistry::default());
    let _rx = registry.register("abc").unwrap();
    let body = json!({"id": "abc", "status": "RUNNING"});

    for (method, uri) in [
        ("GET", "/checks/abc"),
        ("POST", "/checks/abc"),
        ("PUT", "/checks/abc"),
        ("PATCH", "/check/abc"),
        ("PATCH", "/checks/"),
        ("PATCH", "/checks/abc/extra"),
        ("PATCH", "/"),
    ] {
        let status = status_of(&registry, request(method, uri, body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{method} {uri}");
    }
}

#[tokio::test]
async fn unknown_check_is_rejected_without_side_effects() {
    let registry = Arc::new(PushRegistry::default());
    let mut rx = registry.register("known").unwrap();

    let status = status_of(
        &registry,
        request("PATCH", "/checks/unknown-id", json!({"id": "unknown-id", "status": "FINISHED"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(registry.len(), 1);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn rejects_bad_bodies() {
    let registry = Arc::new(PushRegistry::default());
    let mut rx = registry.register("abc").unwrap();

    let bad = Request::builder()
        .method("PATCH")
        .uri("/checks/abc")
        .body(Body::from("{not json"))
        .unwrap();
    assert_eq!(status_of(&registry, bad).await, StatusCode::BAD_REQUEST);

    let missing_id = request("PATCH", "/checks/abc", json!({"status": "RUNNING"}));
    assert_eq!(status_of(&registry, missing_id).await, StatusCode::BAD_REQUEST);

    let wrong_type = request("PATCH", "/checks/abc", json!({"id": "abc", "progress": "half"}));
    assert_eq!(status_of(&registry, wrong_type).await, StatusCode::BAD_REQUEST);

    let mismatch = request("PATCH", "/checks/abc", json!({"id": "other"}));
    assert_eq!(status_of(&registry, mismatch).await, StatusCode::BAD_REQUEST);

    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn forwards_valid_pushes() {
    let registry = Arc::new(PushRegistry::default());
    let mut rx = registry.register("abc").unwrap();

    let req = request(
        "PATCH",
        "/checks/abc",
        json!({
            "id": "abc",
            "status": "RUNNING",
            "agent_id": "agent-1",
            "report": "r",
            "progress": 0.25
        }),
    );
    assert_eq!(status_of(&registry, req).await, StatusCode::OK);

    let update = rx.recv().await.unwrap();
    assert_eq!(update.status, Some(ReportedState::Known(State::Running)));
    assert_eq!(update.agent_id.as_deref(), Some("agent-1"));
    assert_eq!(update.report.as_deref(), Some("r"));
    assert_eq!(update.raw, None);
    assert_eq!(update.progress, Some(0.25));

    // Unknown status text is forwarded; the run decides it is malformed.
    let req = request("PATCH", "/checks/abc", json!({"id": "abc", "status": "DONE"}));
    assert_eq!(status_of(&registry, req).await, StatusCode::OK);
    let update = rx.recv().await.unwrap();
    assert_eq!(update.status, Some(ReportedState::Unknown("DONE".into())));
}

#[tokio::test]
async fn stalled_stream_answers_500() {
    let registry = Arc::new(PushRegistry::new(1, Duration::from_millis(20)));
    let _rx = registry.register("abc").unwrap();

    let first = request("PATCH", "/checks/abc", json!({"id": "abc", "progress": 0.1}));
    assert_eq!(status_of(&registry, first).await, StatusCode::OK);

    let second = request("PATCH", "/checks/abc", json!({"id": "abc", "progress": 0.2}));
    assert_eq!(
        status_of(&registry, second).await,
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[tokio::test]
async fn server_stops_cleanly_and_reports_bind_errors() {
    let registry = Arc::new(PushRegistry::default());
    let token = CancellationToken::new();
    let handle = push::start(
        Arc::clone(&registry),
        "127.0.0.1:0",
        Duration::from_secs(10),
        token.clone(),
    )
    .await
    .unwrap();
    assert!(handle.url().starts_with("http://127.0.0.1:"));

    let taken = handle.local_addr().to_string();
    let err = push::start(
        Arc::clone(&registry),
        &taken,
        Duration::from_secs(1),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PushError::Bind { .. }));
    assert_eq!(err.as_label(), "push_bind");

    token.cancel();
    handle.stopped().await.unwrap();
}

#[tokio::test]
async fn shutdown_drain_is_bounded_by_grace() {
    let registry = Arc::new(PushRegistry::new(1, Duration::from_secs(30)));
    let _rx = registry.register("abc").unwrap();
    registry
        .deliver(StatusUpdate::new("abc").with_progress(0.1))
        .await
        .unwrap();

    let token = CancellationToken::new();
    let grace = Duration::from_millis(200);
    let handle = push::start(Arc::clone(&registry), "127.0.0.1:0", grace, token.clone())
        .await
        .unwrap();

    // Blocks in deliver until the stream has room.
    let url = format!("{}/checks/abc", handle.url());
    let in_flight = tokio::spawn(async move {
        reqwest::Client::new()
            .patch(url)
            .json(&json!({"id": "abc", "progress": 0.2}))
            .send()
            .await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!in_flight.is_finished());

    let started = tokio::time::Instant::now();
    token.cancel();
    let err = handle.stopped().await.unwrap_err();
    assert!(matches!(err, PushError::GraceExceeded { .. }));
    assert_eq!(err.as_label(), "push_grace_exceeded");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn container_pushes_over_http() {
    let backend = BackendFn::arc("http-pusher", |ctx: CancellationToken, p: RunParams| async move {
        let client = reqwest::Client::new();
        let url = format!("{}/checks/{}", p.push_address, p.check_id);
        for body in [
            json!({"id": p.check_id, "status": "RUNNING", "progress": 0.5}),
            json!({"id": p.check_id, "status": "FINISHED", "report": "{\"vulnerabilities\":[]}"}),
        ] {
            let res = client
                .patch(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| BackendError::run(e.to_string()))?;
            if res.status() != reqwest::StatusCode::OK {
                return Err(BackendError::run(format!("push rejected: {}", res.status())));
            }
        }
        ctx.cancelled().await;
        Ok(b"done".to_vec())
    });

    let mut cfg = Config::default();
    cfg.push.listen = "127.0.0.1:0".into();
    cfg.backend_grace = Duration::from_secs(1);
    let (rt, push) = Runtime::start(cfg, backend).await.unwrap();
    assert!(rt.push_address().starts_with("http://127.0.0.1:"));

    let outcome = rt.run(Check::new("acme/scan:1", "example.com")).await.unwrap();
    assert_eq!(outcome.state, State::Finished);
    assert_eq!(outcome.report.as_deref(), Some("{\"vulnerabilities\":[]}"));
    assert_eq!(outcome.progress, Some(0.5));
    assert_eq!(outcome.output, b"done");
    assert!(outcome.error.is_none());

    // A late push for the finished run is refused.
    let late = reqwest::Client::new()
        .patch(format!("{}/checks/{}", rt.push_address(), outcome.id))
        .json(&json!({"id": outcome.id, "status": "FINISHED"}))
        .send()
        .await
        .unwrap();
    assert_eq!(late.status(), reqwest::StatusCode::BAD_REQUEST);

    assert!(!rt.is_registered(&outcome.id));

    rt.shutdown().await.unwrap();
    push.stopped().await.unwrap();
}
