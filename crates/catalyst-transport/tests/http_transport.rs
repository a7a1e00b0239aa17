//! Integration tests for `HttpTransport` using wiremock.
//!
//! These tests run the transport against a mock controller, covering token
//! authentication, routing, task handle extraction, retries and error
//! mapping.

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use catalyst_core::{ControllerVersion, Record};
use catalyst_transport::{HttpTransport, RetryConfig, Transport, TransportConfig, TransportError};

// =============================================================================
// Test Helpers
// =============================================================================

const TOKEN_PATH: &str = "/dna/system/api/v1/auth/token";

async fn setup_mock_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Token": "tok-1"})))
        .mount(&server)
        .await;
    server
}

fn create_transport(server: &MockServer, retry: RetryConfig) -> HttpTransport {
    let config = TransportConfig::new("ignored", "admin", "secret")
        .with_base_url(server.uri())
        .with_retry(retry);
    HttpTransport::new(config).unwrap()
}

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 3,
        initial_backoff_ms: 5,
        max_backoff_ms: 20,
        ..RetryConfig::default()
    }
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_version_with_token() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/dna/intent/api/v1/dnac-release"))
        .and(header("X-Auth-Token", "tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {"displayVersion": "2.3.7.9-70301", "installedVersion": "2.3.7.9"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = create_transport(&server, RetryConfig::disabled());
    let version = transport.version().await.unwrap();
    assert_eq!(version, ControllerVersion::V2_3_7_9);
}

#[tokio::test]
async fn test_bad_credentials_are_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "Authentication has failed"})),
        )
        .mount(&server)
        .await;

    let transport = create_transport(&server, RetryConfig::disabled());
    let err = transport.version().await.unwrap_err();
    assert!(matches!(err, TransportError::Authentication(_)), "{err:?}");
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_expired_token_is_refreshed_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Token": "tok-1"})))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/dna/intent/api/v1/sites"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dna/intent/api/v1/sites"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": []})))
        .mount(&server)
        .await;

    let transport = create_transport(&server, RetryConfig::disabled());
    let result = transport
        .invoke("site_design", "get_sites", &Record::new(), false)
        .await
        .unwrap();
    assert_eq!(result.payload(), &json!([]));
}

// =============================================================================
// Routing
// =============================================================================

#[tokio::test]
async fn test_read_parameters_become_query() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/dna/intent/api/v1/sites"))
        .and(query_param("nameHierarchy", "Global/USA/SJC"))
        .and(query_param("offset", "1"))
        .and(query_param("limit", "500"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": [{"id": "S1", "nameHierarchy": "Global/USA/SJC", "type": "area"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = create_transport(&server, RetryConfig::disabled());
    let params = Record::new()
        .with("nameHierarchy", "Global/USA/SJC")
        .with("offset", 1)
        .with("limit", 500);
    let result = transport
        .invoke("site_design", "get_sites", &params, false)
        .await
        .unwrap();
    assert_eq!(result.payload()[0]["id"], "S1");
    assert!(result.task_id.is_none());
}

#[tokio::test]
async fn test_write_returns_task_handle() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/dna/intent/api/v1/sites/S1/wirelessSettings/ssids"))
        .and(body_json(json!({"ssid": "Corp", "authType": "WPA2_PERSONAL"})))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "response": {"taskId": "task-42", "url": "/api/v1/task/task-42"},
            "version": "1.0"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = create_transport(&server, RetryConfig::disabled());
    let params = Record::new()
        .with("site_id", "S1")
        .with("payload", json!({"ssid": "Corp", "authType": "WPA2_PERSONAL"}));
    let result = transport
        .invoke("wireless", "create_ssid", &params, true)
        .await
        .unwrap();
    assert_eq!(result.task_id.as_deref(), Some("task-42"));
}

#[tokio::test]
async fn test_task_status_fetch() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/dna/intent/api/v1/task/task-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {
                "id": "task-42",
                "isError": true,
                "failureReason": "SSID already exists",
                "errorCode": "NCND80010",
                "endTime": 1_700_000_000_000_i64
            }
        })))
        .mount(&server)
        .await;

    let transport = create_transport(&server, RetryConfig::disabled());
    let status = transport.task_status("task-42").await.unwrap();
    assert!(status.is_error);
    assert_eq!(status.error_reason.as_deref(), Some("SSID already exists"));
    assert_eq!(status.error_code.as_deref(), Some("NCND80010"));
}

#[tokio::test]
async fn test_unknown_operation() {
    let server = setup_mock_server().await;
    let transport = create_transport(&server, RetryConfig::disabled());
    let err = transport
        .invoke("wireless", "reboot_everything", &Record::new(), true)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::UnknownOperation { .. }));
}

// =============================================================================
// Retries and errors
// =============================================================================

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/dna/intent/api/v1/sda/fabricSites"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dna/intent/api/v1/sda/fabricSites"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": []})))
        .expect(1)
        .mount(&server)
        .await;

    let transport = create_transport(&server, fast_retry());
    let result = transport
        .invoke("sda", "get_fabric_sites", &Record::new(), false)
        .await;
    assert!(result.is_ok(), "{result:?}");
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/dna/intent/api/v1/sda/fabricZones"))
        .respond_with(ResponseTemplate::new(502))
        .expect(4)
        .mount(&server)
        .await;

    let transport = create_transport(&server, fast_retry());
    let err = transport
        .invoke("sda", "get_fabric_zones", &Record::new(), false)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(502));
}

#[tokio::test]
async fn test_client_errors_carry_controller_reason() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/dna/intent/api/v1/areas"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "response": {"errorCode": "NCGR10008", "detail": "Parent site not found"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = create_transport(&server, fast_retry());
    let params = Record::new().with("payload", json!({"name": "SJC", "parentId": "nope"}));
    let err = transport
        .invoke("site_design", "create_area", &params, true)
        .await
        .unwrap_err();
    match err {
        TransportError::Http {
            status, message, ..
        } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Parent site not found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

fn slow_transport(server: &MockServer) -> HttpTransport {
    let mut config = TransportConfig::new("ignored", "admin", "secret")
        .with_base_url(server.uri())
        .with_retry(fast_retry());
    config.timeout_seconds = 1;
    HttpTransport::new(config).unwrap()
}

#[tokio::test]
async fn test_timed_out_mutation_is_not_resent() {
    let server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path("/dna/intent/api/v1/areas"))
        .respond_with(
            ResponseTemplate::new(202)
                .set_body_json(json!({"response": {"taskId": "task-1"}}))
                .set_delay(std::time::Duration::from_millis(1500)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let transport = slow_transport(&server);
    let params = Record::new().with("payload", json!({"name": "SJC", "parentId": "A1"}));
    let err = transport
        .invoke("site_design", "create_area", &params, true)
        .await
        .unwrap_err();
    match err {
        TransportError::Connection { attempts, .. } => assert_eq!(attempts, 1),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_timed_out_read_is_retried() {
    let server = setup_mock_server().await;

    Mock::given(method("GET"))
        .and(path("/dna/intent/api/v1/sda/fabricSites"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"response": []}))
                .set_delay(std::time::Duration::from_millis(1500)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dna/intent/api/v1/sda/fabricSites"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": []})))
        .expect(1)
        .mount(&server)
        .await;

    let transport = slow_transport(&server);
    let result = transport
        .invoke("sda", "get_fabric_sites", &Record::new(), false)
        .await;
    assert!(result.is_ok(), "{result:?}");
}
