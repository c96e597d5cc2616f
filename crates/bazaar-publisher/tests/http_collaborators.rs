//! Integration tests for the HTTP policy engine and governance clients
//! against canned local servers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bazaar_audit::LifecycleEventType;
use bazaar_core::{
    AuthMode, ComplianceDescriptor, ComplianceLevel, EndpointDescriptor, PricingDescriptor,
    PricingModel, Protocol, Service, ServiceCategory, ServiceId, ServiceSpecification,
    SlaDescriptor, SupportLevel,
};
use bazaar_publisher::{
    ApprovalDecision, ApprovalRequest, Governance, GovernanceError, HttpGovernanceClient,
    HttpPolicyEngine, PolicyEngine, PolicyEngineError, Severity,
};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

fn spec() -> ServiceSpecification {
    ServiceSpecification {
        name: "ledger-embed".to_string(),
        version: "2.1.0".to_string(),
        description: "Embeddings for financial documents".to_string(),
        category: ServiceCategory::Embeddings,
        tags: std::collections::BTreeSet::new(),
        capabilities: vec!["embed".to_string()],
        endpoint: EndpointDescriptor {
            url: "https://embed.example.com/v2".to_string(),
            protocol: Protocol::Rest,
            auth_mode: AuthMode::Oauth2,
        },
        pricing: PricingDescriptor {
            model: PricingModel::Free,
            unit_price: None,
            monthly_price: None,
            tiers: Vec::new(),
            currency: "USD".to_string(),
        },
        sla: SlaDescriptor {
            availability: 99.95,
            max_latency_ms: 250,
            support_level: SupportLevel::Enterprise,
        },
        compliance: ComplianceDescriptor {
            level: ComplianceLevel::Confidential,
            data_residency: vec!["DE".to_string()],
            certifications: vec!["SOC2".to_string()],
        },
        openapi: None,
    }
}

fn service() -> Service {
    Service::new(
        ServiceId::generate(),
        "acme",
        spec(),
        Some("reg-7".to_string()),
    )
}

/// Reads one request, headers and body.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&raw).to_string();
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if raw.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&raw).to_string()
}

async fn respond(socket: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    socket.write_all(response.as_bytes()).await.unwrap();
    socket.shutdown().await.ok();
}

/// Answers one connection per canned response, in order, and returns the
/// raw requests.
async fn serve_sequence(
    responses: Vec<(&'static str, &'static str)>,
) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut socket).await);
            respond(&mut socket, status, body).await;
        }
        requests
    });

    (base, handle)
}

async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let (base, handle) = serve_sequence(vec![(status, body)]).await;
    let single = tokio::spawn(async move { handle.await.unwrap().remove(0) });
    (base, single)
}

/// Answers every connection with the same response and counts them.
async fn serve_forever(
    status: &'static str,
    body: &'static str,
) -> (String, Arc<AtomicUsize>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&hits);
    let handle = tokio::spawn(async move {
        loop {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            counter.fetch_add(1, Ordering::SeqCst);
            respond(&mut socket, status, body).await;
        }
    });

    (base, hits, handle)
}

fn json_body(request: &str) -> Value {
    let (_, body) = request.split_once("\r\n\r\n").unwrap();
    serde_json::from_str(body).unwrap()
}

fn governance(base: &str) -> HttpGovernanceClient {
    HttpGovernanceClient::new(base, Duration::from_secs(2))
        .unwrap()
        .with_token("gov-token")
        .with_poll_interval(Duration::from_millis(10))
}

// Policy engine

#[tokio::test]
async fn test_policy_request_and_result() {
    let (base, server) = serve_once(
        "200 OK",
        r#"{
            "compliant": true,
            "violations": [
                {"policy": "data-residency", "severity": "critical", "message": "region not allowed", "remediation": "deploy in eu"},
                {"policy": "sla", "severity": "low", "message": "latency is high"}
            ],
            "policyVersion": "2024.06",
            "validatedAt": "2024-06-01T12:00:00Z"
        }"#,
    )
    .await;

    let engine = HttpPolicyEngine::new(&base, Duration::from_secs(2))
        .unwrap()
        .with_token("policy-token");
    let result = engine.validate_service(&spec()).await.unwrap();

    // The critical violation overrides the engine's verdict.
    assert!(!result.compliant);
    assert_eq!(result.policy_version, "2024.06");
    assert_eq!(result.violations.len(), 2);
    assert_eq!(result.violations[0].severity, Severity::Critical);
    assert_eq!(
        result.violations[0].remediation.as_deref(),
        Some("deploy in eu")
    );
    assert_eq!(result.violations[1].remediation, None);

    let request = server.await.unwrap();
    let lowered = request.to_lowercase();
    assert!(lowered.starts_with("post /v1/policies/validate http/1.1"));
    assert!(lowered.contains("authorization: bearer policy-token"));

    let body = json_body(&request);
    assert_eq!(body["name"], "ledger-embed");
    assert_eq!(body["version"], "2.1.0");
    assert_eq!(body["endpointUrl"], "https://embed.example.com/v2");
    assert_eq!(body["authMode"], "oauth2");
    assert_eq!(body["compliance"]["level"], "confidential");
}

#[tokio::test]
async fn test_policy_compliant_result_passes_through() {
    let (base, server) = serve_once(
        "200 OK",
        r#"{"compliant": true, "policyVersion": "v3", "validatedAt": "2024-06-01T12:00:00Z"}"#,
    )
    .await;

    let engine = HttpPolicyEngine::new(&base, Duration::from_secs(2)).unwrap();
    let result = engine.validate_service(&spec()).await.unwrap();
    server.await.unwrap();

    assert!(result.compliant);
    assert!(result.violations.is_empty());
}

#[tokio::test]
async fn test_policy_server_error_is_retryable() {
    let (base, server) = serve_once("503 Service Unavailable", "engine warming up").await;

    let engine = HttpPolicyEngine::new(&base, Duration::from_secs(2)).unwrap();
    let err = engine.validate_service(&spec()).await.unwrap_err();
    server.await.unwrap();

    assert!(
        matches!(&err, PolicyEngineError::HttpError { status: 503, message } if message == "engine warming up")
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_policy_client_error_is_not_retryable() {
    let (base, server) = serve_once("404 Not Found", "{}").await;

    let engine = HttpPolicyEngine::new(&base, Duration::from_secs(2)).unwrap();
    let err = engine.validate_service(&spec()).await.unwrap_err();
    server.await.unwrap();

    assert!(matches!(err, PolicyEngineError::HttpError { status: 404, .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_policy_unreadable_body_is_invalid_response() {
    let (base, server) = serve_once("200 OK", r#"{"compliant": "maybe"}"#).await;

    let engine = HttpPolicyEngine::new(&base, Duration::from_secs(2)).unwrap();
    let err = engine.validate_service(&spec()).await.unwrap_err();
    server.await.unwrap();

    assert!(matches!(err, PolicyEngineError::InvalidResponse { .. }), "{err}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_policy_timeout_is_retryable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let budget = Duration::from_millis(100);
    let engine = HttpPolicyEngine::new(&base, budget).unwrap();
    let err = engine.validate_service(&spec()).await.unwrap_err();
    server.abort();

    assert!(matches!(err, PolicyEngineError::Timeout { after } if after == budget), "{err}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_policy_connection_refused_is_retryable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let engine = HttpPolicyEngine::new(&base, Duration::from_secs(2)).unwrap();
    let err = engine.validate_service(&spec()).await.unwrap_err();
    assert!(matches!(err, PolicyEngineError::Unavailable { .. }), "{err}");
    assert!(err.is_retryable());
}

// Governance

#[tokio::test]
async fn test_find_in_flight_workflow() {
    let (base, server) = serve_once(
        "200 OK",
        r#"{"workflows":[{"id":"wf-done","state":"approved"},{"id":"wf-9","state":"pending"}]}"#,
    )
    .await;
    let service_id = ServiceId::generate();

    let found = governance(&base)
        .find_in_flight_workflow(&service_id)
        .await
        .unwrap();
    assert_eq!(found.as_deref(), Some("wf-9"));

    let request = server.await.unwrap();
    assert!(request.starts_with(&format!(
        "GET /v1/workflows?serviceId={service_id}&state=pending HTTP/1.1"
    )));
    assert!(request
        .to_lowercase()
        .contains("authorization: bearer gov-token"));
}

#[tokio::test]
async fn test_find_in_flight_workflow_none_open() {
    let (base, server) = serve_once("200 OK", r#"{"workflows":[]}"#).await;

    let found = governance(&base)
        .find_in_flight_workflow(&ServiceId::generate())
        .await
        .unwrap();
    server.await.unwrap();
    assert_eq!(found, None);
}

#[tokio::test]
async fn test_create_workflow() {
    let (base, server) = serve_once("201 Created", r#"{"id":"wf-12"}"#).await;
    let service = service();

    let request = ApprovalRequest::for_service(&service, "5/5 checks passed");
    let workflow_id = governance(&base)
        .create_approval_workflow(&request)
        .await
        .unwrap();
    assert_eq!(workflow_id, "wf-12");

    let raw = server.await.unwrap();
    assert!(raw.to_lowercase().starts_with("post /v1/workflows http/1.1"));
    let body = json_body(&raw);
    assert_eq!(body["serviceId"], service.id.to_string());
    assert_eq!(body["providerId"], "acme");
    assert_eq!(body["complianceLevel"], "confidential");
    assert_eq!(body["supportLevel"], "enterprise");
    assert_eq!(body["testSummary"], "5/5 checks passed");
}

#[tokio::test]
async fn test_create_workflow_server_error_is_retryable() {
    let (base, server) = serve_once("502 Bad Gateway", "upstream down").await;

    let request = ApprovalRequest::for_service(&service(), "ok");
    let err = governance(&base)
        .create_approval_workflow(&request)
        .await
        .unwrap_err();
    server.await.unwrap();

    assert!(matches!(err, GovernanceError::HttpError { status: 502, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_wait_polls_until_approved() {
    let (base, server) = serve_sequence(vec![
        ("200 OK", r#"{"id":"wf-1","state":"pending"}"#),
        ("200 OK", r#"{"id":"wf-1","state":"pending"}"#),
        ("200 OK", r#"{"id":"wf-1","state":"approved","reviewer":"alice"}"#),
    ])
    .await;

    let decision = governance(&base)
        .wait_for_approval("wf-1", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(
        decision,
        ApprovalDecision::Approved {
            reviewer: Some("alice".to_string())
        }
    );

    let requests = server.await.unwrap();
    assert_eq!(requests.len(), 3);
    assert!(requests
        .iter()
        .all(|r| r.starts_with("GET /v1/workflows/wf-1 HTTP/1.1")));
}

#[tokio::test]
async fn test_wait_maps_rejection_reason() {
    let (base, server) = serve_once(
        "200 OK",
        r#"{"id":"wf-2","state":"rejected","reason":"missing runbook"}"#,
    )
    .await;

    let decision = governance(&base)
        .wait_for_approval("wf-2", Duration::from_secs(5))
        .await
        .unwrap();
    server.await.unwrap();

    assert_eq!(
        decision,
        ApprovalDecision::Rejected {
            reason: Some("missing runbook".to_string())
        }
    );
}

#[tokio::test]
async fn test_wait_keeps_polling_through_server_errors() {
    let (base, server) = serve_sequence(vec![
        ("503 Service Unavailable", "restarting"),
        ("200 OK", r#"{"id":"wf-3","state":"pending"}"#),
        ("200 OK", r#"{"id":"wf-3","state":"approved"}"#),
    ])
    .await;

    let decision = governance(&base)
        .wait_for_approval("wf-3", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(decision, ApprovalDecision::Approved { reviewer: None });
    assert_eq!(server.await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_wait_missing_workflow_fails_fast() {
    let (base, server) = serve_once("404 Not Found", "{}").await;

    let err = governance(&base)
        .wait_for_approval("wf-gone", Duration::from_secs(5))
        .await
        .unwrap_err();
    server.await.unwrap();

    assert!(
        matches!(&err, GovernanceError::WorkflowNotFound { workflow_id } if workflow_id == "wf-gone")
    );
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_wait_times_out_at_deadline() {
    let (base, hits, server) = serve_forever("200 OK", r#"{"id":"wf-4","state":"pending"}"#).await;

    let started = std::time::Instant::now();
    let decision = governance(&base)
        .wait_for_approval("wf-4", Duration::from_millis(150))
        .await
        .unwrap();
    let elapsed = started.elapsed();
    server.abort();

    assert_eq!(decision, ApprovalDecision::TimedOut);
    assert!(hits.load(Ordering::SeqCst) >= 2);
    assert!(elapsed >= Duration::from_millis(150));
    assert!(elapsed < Duration::from_secs(2), "{elapsed:?}");
}

#[tokio::test]
async fn test_notify_posts_event() {
    let (base, server) = serve_once("202 Accepted", "").await;
    let service = service();

    governance(&base)
        .notify(&service, LifecycleEventType::Activated)
        .await
        .unwrap();

    let raw = server.await.unwrap();
    assert!(raw
        .to_lowercase()
        .starts_with("post /v1/notifications http/1.1"));
    let body = json_body(&raw);
    assert_eq!(body["serviceId"], service.id.to_string());
    assert_eq!(body["providerId"], "acme");
    assert_eq!(body["name"], "ledger-embed");
    assert_eq!(body["version"], "2.1.0");
    assert_eq!(body["status"], "pending_approval");
    assert_eq!(body["event"], "service.activated");
}

#[tokio::test]
async fn test_notify_rejected_by_dashboard() {
    let (base, server) = serve_once("400 Bad Request", r#"{"error":"unknown event"}"#).await;

    let err = governance(&base)
        .notify(&service(), LifecycleEventType::Activated)
        .await
        .unwrap_err();
    server.await.unwrap();

    assert!(matches!(err, GovernanceError::HttpError { status: 400, .. }));
    assert!(!err.is_retryable());
}
