//! End-to-end tests driving the gateway over loopback.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use reqwest::StatusCode;
use stream_relay::config::{RateLimitConfig, StreamKind};
use stream_relay::error::ErrorKind;

#[tokio::test]
async fn test_sse_stream_relayed_and_audited() {
    let upstream = fixed_upstream(sse_response("data: {\"id\":1}\ndata: [DONE]\n")).await;
    let audit = Arc::new(RecordingAuditSink::default());
    let gateway = start_gateway(
        relay_config(vec![route("chat", "/v1/chat", &upstream.url(), StreamKind::Sse)]),
        audit.clone(),
    )
    .await;

    let response = client()
        .get(gateway.url("/v1/chat/completions?stream=true"))
        .bearer_auth(API_KEY)
        .header("x-tenant-id", "acme")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    let request_id = response.headers()["x-request-id"].to_str().unwrap().to_string();
    let body = response.text().await.unwrap();
    assert_eq!(body, "data: {\"id\":1}\ndata: [DONE]\n");

    let record = audit.wait_for(1).await.remove(0);
    assert_eq!(record.request_id, request_id);
    assert_eq!(record.tenant_id, "acme");
    assert_eq!(record.route, "chat");
    assert_eq!(record.kind, Some(StreamKind::Sse));
    assert_eq!(record.status_code, 200);
    assert_eq!(record.chunks_count, 2);
    assert_eq!(record.response_chunks, vec!["data: {\"id\":1}", "data: [DONE]"]);
    assert!(record.ttft_ms.is_some());
    assert!(record.error_type.is_none());
    assert_eq!(record.provider, "unknown");

    let requests = upstream.requests();
    assert_eq!(requests.len(), 1);
    let head = requests[0].to_ascii_lowercase();
    assert!(head.starts_with("get /v1/chat/completions?stream=true http/1.1"));
    assert!(!head.contains(API_KEY));
    assert!(head.contains(&format!("x-request-id: {request_id}")));
}

#[tokio::test]
async fn test_upstream_credential_replaces_client_key() {
    std::env::set_var("GATEWAY_TEST_UPSTREAM_KEY", "sk-upstream-secret");
    let upstream = fixed_upstream(sse_response("data: [DONE]\n")).await;
    let mut chat = route("chat", "/v1/chat", &upstream.url(), StreamKind::Sse);
    chat.auth_header = Some("Authorization".into());
    chat.auth_env = Some("GATEWAY_TEST_UPSTREAM_KEY".into());
    let gateway = start_gateway(relay_config(vec![chat]), Arc::new(RecordingAuditSink::default())).await;

    let response = client()
        .post(gateway.url("/v1/chat/completions"))
        .bearer_auth(API_KEY)
        .body("{\"model\":\"m\"}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response.text().await.unwrap();

    let request = upstream.requests().remove(0);
    let lower = request.to_ascii_lowercase();
    assert!(lower.contains("authorization: bearer sk-upstream-secret"));
    assert!(!lower.contains(API_KEY));
    assert!(request.ends_with("{\"model\":\"m\"}"));
}

#[tokio::test]
async fn test_raw_stream_relayed_without_transcript() {
    let audio: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    let upstream = fixed_upstream(response("200 OK", "audio/mpeg", &audio)).await;
    let audit = Arc::new(RecordingAuditSink::default());
    let mut config = relay_config(vec![route("tts", "/v1/audio", &upstream.url(), StreamKind::Raw)]);
    config.stream.raw_chunk_size = 4096;
    let gateway = start_gateway(config, audit.clone()).await;

    let response = client()
        .post(gateway.url("/v1/audio/speech"))
        .bearer_auth(API_KEY)
        .body("{\"input\":\"hello\"}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "audio/mpeg");
    let body = response.bytes().await.unwrap();
    assert_eq!(&body[..], &audio[..]);

    let record = audit.wait_for(1).await.remove(0);
    assert_eq!(record.kind, Some(StreamKind::Raw));
    assert_eq!(record.bytes_out, 100_000);
    assert_eq!(record.bytes_in, 17);
    assert!(record.chunks_count >= 25);
    assert!(record.ttfa_ms.is_some());
    assert!(record.ttft_ms.is_none());
    assert!(record.response_chunks.is_empty());
}

#[tokio::test]
async fn test_first_matching_route_wins() {
    let chat = fixed_upstream(sse_response("data: chat\n")).await;
    let root = fixed_upstream(sse_response("data: root\n")).await;
    let gateway = start_gateway(
        relay_config(vec![
            route("chat", "/v1/chat", &chat.url(), StreamKind::Sse),
            route("chatroot", "/v1", &root.url(), StreamKind::Sse),
        ]),
        Arc::new(RecordingAuditSink::default()),
    )
    .await;

    let body = client()
        .get(gateway.url("/v1/chat/completions"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "data: chat\n");
    assert!(root.requests().is_empty());
}

#[tokio::test]
async fn test_unauthorized_precedes_rate_limit_and_routing() {
    let audit = Arc::new(RecordingAuditSink::default());
    let upstream = fixed_upstream(sse_response("data: x\n")).await;
    let mut config = relay_config(vec![route("chat", "/v1/chat", &upstream.url(), StreamKind::Sse)]);
    config.rate_limit = RateLimitConfig {
        enabled: true,
        requests_per_minute: 1,
        burst: 1,
        ..RateLimitConfig::default()
    };
    let gateway = start_gateway(config, audit.clone()).await;
    let client = client();

    let first = client
        .get(gateway.url("/v1/chat/completions"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    first.text().await.unwrap();

    let limited = client
        .get(gateway.url("/v1/chat/completions"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

    for path in ["/v1/chat/completions", "/no/such/route"] {
        let response = client
            .get(gateway.url(path))
            .bearer_auth("wrong-key")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json: serde_json::Value = response.json().await.unwrap();
        assert_eq!(json["kind"], "unauthorized");
    }

    let missing = client.get(gateway.url("/no/such/route")).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(upstream.requests().len(), 1);
    assert_eq!(audit.wait_for(1).await.len(), 1);
}

#[tokio::test]
async fn test_tenants_limited_independently() {
    let upstream = fixed_upstream(sse_response("data: x\n")).await;
    let mut config = relay_config(vec![route("chat", "/v1/chat", &upstream.url(), StreamKind::Sse)]);
    config.rate_limit = RateLimitConfig {
        enabled: true,
        requests_per_minute: 1,
        burst: 1,
        ..RateLimitConfig::default()
    };
    let gateway = start_gateway(config, Arc::new(RecordingAuditSink::default())).await;
    let client = client();

    let send = |tenant: &'static str| {
        client
            .get(gateway.url("/v1/chat/completions"))
            .bearer_auth(API_KEY)
            .header("x-tenant-id", tenant)
            .send()
    };

    let a = send("tenant-a").await.unwrap();
    assert_eq!(a.status(), StatusCode::OK);
    a.text().await.unwrap();
    assert_eq!(send("tenant-a").await.unwrap().status(), StatusCode::TOO_MANY_REQUESTS);

    let b = send("tenant-b").await.unwrap();
    assert_eq!(b.status(), StatusCode::OK);
    b.text().await.unwrap();
}

#[tokio::test]
async fn test_unknown_route_is_audited() {
    let audit = Arc::new(RecordingAuditSink::default());
    let upstream = fixed_upstream(sse_response("data: x\n")).await;
    let gateway = start_gateway(
        relay_config(vec![route("chat", "/v1/chat", &upstream.url(), StreamKind::Sse)]),
        audit.clone(),
    )
    .await;

    let response = client()
        .get(gateway.url("/v2/models"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().contains_key("x-request-id"));

    let record = audit.wait_for(1).await.remove(0);
    assert_eq!(record.route, "none");
    assert_eq!(record.kind, None);
    assert_eq!(record.status_code, 404);
    assert_eq!(record.error_type, Some(ErrorKind::RouteNotFound));
    assert!(upstream.requests().is_empty());
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let audit = Arc::new(RecordingAuditSink::default());
    let dead = format!("http://{}", unused_addr().await);
    let gateway = start_gateway(
        relay_config(vec![route("chat", "/v1/chat", &dead, StreamKind::Sse)]),
        audit.clone(),
    )
    .await;

    let response = client()
        .post(gateway.url("/v1/chat/completions"))
        .bearer_auth(API_KEY)
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["kind"], "upstream_error");

    let record = audit.wait_for(1).await.remove(0);
    assert_eq!(record.route, "chat");
    assert_eq!(record.status_code, 502);
    assert_eq!(record.error_type, Some(ErrorKind::UpstreamError));
    assert_eq!(record.request_body, "{}");
    assert_eq!(record.bytes_out, 0);
}

#[tokio::test]
async fn test_oversized_body_never_reaches_upstream() {
    let audit = Arc::new(RecordingAuditSink::default());
    let upstream = fixed_upstream(sse_response("data: x\n")).await;
    let mut config = relay_config(vec![route("chat", "/v1/chat", &upstream.url(), StreamKind::Sse)]);
    config.server.max_body_size = 16;
    let gateway = start_gateway(config, audit.clone()).await;

    let response = client()
        .post(gateway.url("/v1/chat/completions"))
        .bearer_auth(API_KEY)
        .body(vec![b'x'; 64])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let record = audit.wait_for(1).await.remove(0);
    assert_eq!(record.error_type, Some(ErrorKind::BodyTooLarge));
    assert!(upstream.requests().is_empty());
}

#[tokio::test]
async fn test_upstream_error_status_relayed_verbatim() {
    let audit = Arc::new(RecordingAuditSink::default());
    let upstream = fixed_upstream(response(
        "429 Too Many Requests",
        "application/json",
        b"{\"error\":\"quota\"}",
    ))
    .await;
    let gateway = start_gateway(
        relay_config(vec![route("chat", "/v1/chat", &upstream.url(), StreamKind::Sse)]),
        audit.clone(),
    )
    .await;

    let response = client()
        .get(gateway.url("/v1/chat/completions"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.text().await.unwrap(), "{\"error\":\"quota\"}\n");

    let record = audit.wait_for(1).await.remove(0);
    assert_eq!(record.status_code, 429);
    assert!(record.error_type.is_none());
    assert!(record.ttft_ms.is_none());
}

#[tokio::test]
async fn test_failing_audit_sink_leaves_response_intact() {
    let upstream = fixed_upstream(sse_response("data: {\"id\":1}\ndata: [DONE]\n")).await;
    let gateway = start_gateway(
        relay_config(vec![route("chat", "/v1/chat", &upstream.url(), StreamKind::Sse)]),
        Arc::new(FailingAuditSink),
    )
    .await;

    let response = client()
        .get(gateway.url("/v1/chat/completions"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.text().await.unwrap(),
        "data: {\"id\":1}\ndata: [DONE]\n"
    );

    let missing = client()
        .get(gateway.url("/v2/none"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_client_disconnect_recorded_as_stream_error() {
    let audit = Arc::new(RecordingAuditSink::default());
    let upstream = ticking_upstream(Duration::from_millis(20), 500).await;
    let gateway = start_gateway(
        relay_config(vec![route("chat", "/v1/chat", &upstream.url(), StreamKind::Sse)]),
        audit.clone(),
    )
    .await;

    let mut response = client()
        .get(gateway.url("/v1/chat/completions"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    let first = response.chunk().await.unwrap().unwrap();
    assert!(first.starts_with(b"data: tick\n"));
    drop(response);

    let record = audit.wait_for(1).await.remove(0);
    assert_eq!(record.status_code, 200);
    assert_eq!(record.error_type, Some(ErrorKind::StreamError));
    assert!(record.chunks_count >= 1);
    assert!(record.chunks_count < 500);
}

#[tokio::test]
async fn test_probes_answer_without_credentials() {
    let gateway = start_gateway(
        relay_config(vec![route("chat", "/v1/chat", "http://127.0.0.1:9", StreamKind::Sse)]),
        Arc::new(RecordingAuditSink::default()),
    )
    .await;
    let client = client();

    let health = client.get(gateway.url("/healthz")).send().await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    let json: serde_json::Value = health.json().await.unwrap();
    assert_eq!(json["status"], "healthy");

    let ready = client.get(gateway.url("/readyz")).send().await.unwrap();
    assert_eq!(ready.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_shutdown_aborts_streams_after_grace() {
    let audit = Arc::new(RecordingAuditSink::default());
    let upstream = ticking_upstream(Duration::from_millis(50), 1_000).await;
    let mut config = relay_config(vec![route("chat", "/v1/chat", &upstream.url(), StreamKind::Sse)]);
    config.server.shutdown_grace_secs = 1;
    let gateway = start_gateway(config, audit.clone()).await;

    let mut response = client()
        .get(gateway.url("/v1/chat/completions"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    response.chunk().await.unwrap().unwrap();

    gateway.shutdown.trigger();

    let drained = async {
        while let Ok(Some(_)) = response.chunk().await {}
    };
    tokio::time::timeout(Duration::from_secs(10), drained)
        .await
        .expect("client stream should end after the grace period");

    tokio::time::timeout(Duration::from_secs(10), gateway.handle)
        .await
        .expect("server should stop")
        .unwrap()
        .unwrap();

    let record = audit.wait_for(1).await.remove(0);
    assert_eq!(record.error_type, Some(ErrorKind::StreamError));
    assert!(record.chunks_count >= 1);
}

#[tokio::test]
async fn test_shutdown_with_idle_server_returns_promptly() {
    let gateway = start_gateway(
        relay_config(vec![route("chat", "/v1/chat", "http://127.0.0.1:9", StreamKind::Sse)]),
        Arc::new(RecordingAuditSink::default()),
    )
    .await;

    gateway.shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), gateway.handle)
        .await
        .expect("idle server should stop immediately")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_concurrent_streams_each_audited_once() {
    let audit = Arc::new(RecordingAuditSink::default());
    let upstream = ticking_upstream(Duration::from_millis(5), 20).await;
    let gateway = start_gateway(
        relay_config(vec![route("chat", "/v1/chat", &upstream.url(), StreamKind::Sse)]),
        audit.clone(),
    )
    .await;
    let client = client();

    let requests = (0..50).map(|i| {
        let request = client
            .get(gateway.url("/v1/chat/completions"))
            .bearer_auth(API_KEY)
            .header("x-tenant-id", format!("tenant-{}", i % 5));
        async move { request.send().await.unwrap().text().await.unwrap() }
    });
    let bodies = futures_util::future::join_all(requests).await;

    for body in &bodies {
        assert_eq!(body, &"data: tick\n".repeat(20));
    }

    let records = audit.wait_for(50).await;
    assert_eq!(records.len(), 50);
    let mut ids: Vec<_> = records.iter().map(|r| r.request_id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 50);
    assert!(records.iter().all(|r| r.chunks_count == 20 && r.error_type.is_none()));
}

#[tokio::test]
async fn test_upstream_timeout_is_gateway_timeout() {
    let audit = Arc::new(RecordingAuditSink::default());
    let upstream = delayed_upstream(Duration::from_secs(3), sse_response("data: late\n")).await;
    let mut config = relay_config(vec![route("chat", "/v1/chat", &upstream.url(), StreamKind::Sse)]);
    config.server.request_timeout_secs = 1;
    let gateway = start_gateway(config, audit.clone()).await;

    let response = client()
        .get(gateway.url("/v1/chat/completions"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["kind"], "upstream_error");

    let record = audit.wait_for(1).await.remove(0);
    assert_eq!(record.route, "chat");
    assert_eq!(record.status_code, 504);
    assert_eq!(record.error_type, Some(ErrorKind::UpstreamError));
    assert_eq!(record.chunks_count, 0);
}

#[tokio::test]
async fn test_shutdown_waits_for_pending_upstream_headers() {
    let audit = Arc::new(RecordingAuditSink::default());
    let upstream = delayed_upstream(Duration::from_millis(800), sse_response("data: slow\n")).await;
    let mut config = relay_config(vec![route("chat", "/v1/chat", &upstream.url(), StreamKind::Sse)]);
    config.server.shutdown_grace_secs = 10;
    let gateway = start_gateway(config, audit.clone()).await;

    let request = client()
        .get(gateway.url("/v1/chat/completions"))
        .bearer_auth(API_KEY)
        .send();
    let pending = tokio::spawn(async move {
        let response = request.await.unwrap();
        (response.status(), response.text().await.unwrap())
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    gateway.shutdown.trigger();

    tokio::time::timeout(Duration::from_secs(10), gateway.handle)
        .await
        .expect("server should stop once the request completes")
        .unwrap()
        .unwrap();

    let (status, body) = pending.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "data: slow\n");

    let records = audit.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].error_type.is_none());
}

#[tokio::test]
async fn test_shutdown_aborts_pending_upstream_after_grace() {
    let audit = Arc::new(RecordingAuditSink::default());
    let upstream = delayed_upstream(Duration::from_secs(30), sse_response("data: never\n")).await;
    let mut config = relay_config(vec![route("chat", "/v1/chat", &upstream.url(), StreamKind::Sse)]);
    config.server.shutdown_grace_secs = 2;
    let gateway = start_gateway(config, audit.clone()).await;

    let request = client()
        .get(gateway.url("/v1/chat/completions"))
        .bearer_auth(API_KEY)
        .send();
    let pending = tokio::spawn(async move { request.await.unwrap().status() });

    tokio::time::sleep(Duration::from_millis(300)).await;
    let triggered = tokio::time::Instant::now();
    gateway.shutdown.trigger();

    tokio::time::timeout(Duration::from_secs(10), gateway.handle)
        .await
        .expect("server should stop after the grace period")
        .unwrap()
        .unwrap();
    assert!(
        triggered.elapsed() >= Duration::from_millis(1900),
        "server stopped before the grace period: {:?}",
        triggered.elapsed()
    );

    assert_eq!(pending.await.unwrap(), StatusCode::SERVICE_UNAVAILABLE);

    let records = audit.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].route, "chat");
    assert_eq!(records[0].status_code, 503);
    assert_eq!(records[0].error_type, Some(ErrorKind::UpstreamError));
}
