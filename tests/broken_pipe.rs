//! End-to-end reproductions of the proxy/backend timeout mismatch.

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use broken_pipe::backend::{Outcome, Phase};

mod common;

#[tokio::test]
async fn proxy_timeout_shorter_than_delay_breaks_the_pipe() {
    let delay = Duration::from_secs(2);
    let payload = 32 << 20;
    let mut backend = common::start_backend(common::backend_settings(delay, payload)).await;
    let proxy = common::start_proxy(common::proxy_settings(
        backend.addr,
        Duration::from_millis(300),
    ))
    .await;

    let start = Instant::now();
    let res = common::client()
        .get(format!("http://{}/", proxy.addr))
        .send()
        .await
        .expect("proxy unreachable");
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(start.elapsed() < delay, "proxy waited out the backend delay");

    // The backend sleeps through the whole delay, then fails writing the body.
    let report = common::next_outcome(&mut backend.outcomes).await;
    match report.outcome {
        Outcome::Aborted {
            phase: Phase::Streaming,
            bytes,
        } => assert!(bytes > 0 && bytes < payload),
        other => panic!("expected a failed write, got {other:?}"),
    }
    assert!(report.elapsed >= delay);
    common::assert_no_more_outcomes(&mut backend.outcomes).await;

    proxy.shutdown.trigger();
    backend.shutdown.trigger();
}

#[tokio::test]
async fn proxy_timeout_longer_than_delay_delivers_everything() {
    let payload = 8 << 20;
    let mut backend =
        common::start_backend(common::backend_settings(Duration::from_millis(200), payload)).await;
    let proxy =
        common::start_proxy(common::proxy_settings(backend.addr, Duration::from_secs(5))).await;

    let res = common::client()
        .get(format!("http://{}/", proxy.addr))
        .header("x-request-id", "full-payload")
        .send()
        .await
        .expect("proxy unreachable");
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-request-id"], "full-payload");
    assert_eq!(res.content_length(), Some(payload));

    let body = res.bytes().await.expect("body cut short");
    assert_eq!(body.len() as u64, payload);
    assert!(body.iter().all(|b| *b == 0));

    let report = common::next_outcome(&mut backend.outcomes).await;
    assert_eq!(report.request_id, "full-payload");
    assert_eq!(report.outcome, Outcome::Completed { bytes: payload });
    common::assert_no_more_outcomes(&mut backend.outcomes).await;

    proxy.shutdown.trigger();
    backend.shutdown.trigger();
}

#[tokio::test]
async fn stalled_body_is_cut_mid_stream() {
    let payload = 1 << 20;
    let mut settings = common::backend_settings(Duration::ZERO, payload);
    settings.chunk_interval = Some(Duration::from_millis(600));
    let mut backend = common::start_backend(settings).await;
    let proxy = common::start_proxy(common::proxy_settings(
        backend.addr,
        Duration::from_millis(200),
    ))
    .await;

    let res = common::client()
        .get(format!("http://{}/", proxy.addr))
        .send()
        .await
        .expect("proxy unreachable");
    assert_eq!(res.status(), StatusCode::OK);

    match res.bytes().await {
        Ok(body) => assert!((body.len() as u64) < payload, "body was not truncated"),
        Err(_) => {}
    }

    let report = common::next_outcome(&mut backend.outcomes).await;
    match report.outcome {
        Outcome::Aborted {
            phase: Phase::Streaming,
            bytes,
        } => assert!(bytes > 0 && bytes < payload),
        other => panic!("expected a mid-stream abort, got {other:?}"),
    }
    common::assert_no_more_outcomes(&mut backend.outcomes).await;

    proxy.shutdown.trigger();
    backend.shutdown.trigger();
}

#[tokio::test]
async fn client_leaving_during_delay_fails_on_write() {
    let delay = Duration::from_secs(1);
    let payload = 32 << 20;
    let mut backend = common::start_backend(common::backend_settings(delay, payload)).await;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(200))
        .no_proxy()
        .build()
        .unwrap();
    let err = client
        .get(format!("http://{}/", backend.addr))
        .send()
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let report = common::next_outcome(&mut backend.outcomes).await;
    assert!(
        matches!(
            report.outcome,
            Outcome::Aborted { phase: Phase::Streaming, bytes } if bytes > 0 && bytes < payload
        ),
        "unexpected outcome {:?}",
        report.outcome
    );
    assert!(report.elapsed >= delay);
    common::assert_no_more_outcomes(&mut backend.outcomes).await;

    backend.shutdown.trigger();
}

#[tokio::test]
async fn backend_write_deadline_aborts_the_response() {
    let payload = 2 << 20;
    let mut settings = common::backend_settings(Duration::ZERO, payload);
    settings.chunk_interval = Some(Duration::from_millis(100));
    settings.write_timeout = Duration::from_millis(350);
    let mut backend = common::start_backend(settings).await;

    let res = common::client()
        .get(format!("http://{}/", backend.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.bytes().await.is_err());

    let report = common::next_outcome(&mut backend.outcomes).await;
    assert!(
        matches!(report.outcome, Outcome::WriteTimeout { bytes } if bytes > 0 && bytes < payload),
        "unexpected outcome {:?}",
        report.outcome
    );
    common::assert_no_more_outcomes(&mut backend.outcomes).await;

    backend.shutdown.trigger();
}

#[tokio::test]
async fn unallocatable_payload_is_a_bare_500() {
    let mut settings = common::backend_settings(Duration::ZERO, u64::MAX);
    settings.chunk_bytes = usize::MAX;
    let mut backend = common::start_backend(settings).await;

    let res = common::client()
        .get(format!("http://{}/", backend.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(res.bytes().await.unwrap().is_empty());

    let report = common::next_outcome(&mut backend.outcomes).await;
    assert_eq!(report.outcome.kind(), "build_failed");
    common::assert_no_more_outcomes(&mut backend.outcomes).await;

    backend.shutdown.trigger();
}

#[tokio::test]
async fn backend_only_serves_the_root() {
    let backend = common::start_backend(common::backend_settings(Duration::ZERO, 16)).await;

    let res = common::client()
        .get(format!("http://{}/other", backend.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = common::client()
        .post(format!("http://{}/", backend.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);

    backend.shutdown.trigger();
}
