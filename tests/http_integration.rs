//! Integration tests for the API client using wiremock
//!
//! These tests drive `GcpClient` over a real HTTP transport against mocked
//! endpoints: header composition, error mapping, the auto-enable flow,
//! batching and paging.

use cloudctl::config::Properties;
use cloudctl::console::Console;
use cloudctl::error::CliError;
use cloudctl::gcp::auth::{CredentialKind, StaticToken};
use cloudctl::gcp::batch::{execute_batch, BatchRequest};
use cloudctl::gcp::client::{ClientSettings, GcpClient, RetryPolicy};
use cloudctl::gcp::http::{Method, ReqwestTransport};
use cloudctl::invocation::Interrupt;
use cloudctl::resource::pager::{self, ListRequest};
use cloudctl::resource::poller::PollerConfig;
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{bearer_token, body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn properties() -> Properties {
    Properties {
        project: Some("test-project".into()),
        check_gce_metadata: false,
        ..Properties::default()
    }
}

fn client(server: &MockServer, console: Console, props: &Properties) -> GcpClient {
    let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(5)).unwrap());
    let credentials = Arc::new(StaticToken::new("test-token", CredentialKind::User));
    let mut settings = ClientSettings::from_properties(
        props,
        CredentialKind::User,
        "cloudctl.compute.instances.list",
        console.is_interactive(),
    );
    settings.serviceusage_url = format!("{}/serviceusage/v1/", server.uri());
    settings.enable_retry = RetryPolicy {
        attempts: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
    };
    settings.enable_poll = PollerConfig {
        initial_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        jitter: 0.0,
        ..PollerConfig::default()
    };
    GcpClient::new(transport, credentials, settings, console)
}

fn quiet_console() -> Console {
    Console::captured(&[], false).0
}

/// Header composition and JSON decoding
mod request_tests {
    use super::*;

    /// Test successful GET carries the bearer token and quota project
    #[tokio::test]
    async fn test_get_success_sends_framework_headers() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/zones/us-central1-a/instances"))
            .and(bearer_token("test-token"))
            .and(header("x-goog-user-project", "test-project"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"name": "instance-1", "status": "RUNNING"},
                    {"name": "instance-2", "status": "STOPPED"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, quiet_console(), &properties());
        let url = format!(
            "{}/compute/v1/projects/test-project/zones/us-central1-a/instances",
            server.uri()
        );
        let response = client.get(&url).await.expect("Request should succeed");

        assert_eq!(response["items"].as_array().unwrap().len(), 2);
        assert_eq!(response["items"][0]["name"], "instance-1");
    }

    /// Test the explicit billing project replaces the current project in the quota header
    #[tokio::test]
    async fn test_billing_project_wins_quota_header() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(header("x-goog-user-project", "billing-project"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let props = Properties {
            billing_project: Some("billing-project".into()),
            ..properties()
        };
        let client = client(&server, quiet_console(), &props);
        client
            .get(&format!("{}/compute/v1/projects/test-project", server.uri()))
            .await
            .expect("Request should succeed");
    }

    /// Test POST bodies are sent as JSON
    #[tokio::test]
    async fn test_post_sends_json_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/compute/v1/projects/test-project/zones/z/instances/vm/setLabels"))
            .and(body_json(json!({"labels": {"env": "prod"}, "labelFingerprint": "abc"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "op-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, quiet_console(), &properties());
        let url = format!(
            "{}/compute/v1/projects/test-project/zones/z/instances/vm/setLabels",
            server.uri()
        );
        let op = client
            .post(&url, Some(&json!({"labels": {"env": "prod"}, "labelFingerprint": "abc"})))
            .await
            .unwrap();
        assert_eq!(op["name"], "op-1");
    }

    /// Test an empty success body decodes as null
    #[tokio::test]
    async fn test_empty_body_is_null() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = client(&server, quiet_console(), &properties());
        let response = client
            .delete(&format!("{}/v1/things/a", server.uri()))
            .await
            .unwrap();
        assert!(response.is_null());
    }
}

/// Status codes and their error kinds
mod error_tests {
    use super::*;

    /// Test 404 maps to ResourceNotFound
    #[tokio::test]
    async fn test_404_is_resource_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {
                    "code": 404,
                    "message": "The resource 'projects/test-project/zones/z/instances/missing' was not found",
                    "status": "NOT_FOUND"
                }
            })))
            .mount(&server)
            .await;

        let client = client(&server, quiet_console(), &properties());
        let err = client
            .get(&format!("{}/compute/v1/projects/test-project/zones/z/instances/missing", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::ResourceNotFound { .. }), "{err:?}");
        assert_eq!(err.exit_code(), 1);
    }

    /// Test a plain 403 is PermissionDenied and not routed through enablement
    #[tokio::test]
    async fn test_403_is_permission_denied() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {
                    "code": 403,
                    "message": "Required 'compute.instances.list' permission for 'projects/test-project'",
                    "status": "PERMISSION_DENIED"
                }
            })))
            .mount(&server)
            .await;

        let client = client(&server, quiet_console(), &properties());
        let err = client
            .get(&format!("{}/compute/v1/projects/test-project/instances", server.uri()))
            .await
            .unwrap_err();
        match err {
            CliError::PermissionDenied(http) => {
                assert_eq!(http.status, 403);
                assert_eq!(http.status_name.as_deref(), Some("PERMISSION_DENIED"));
            }
            other => panic!("Expected PermissionDenied, got {other:?}"),
        }
    }

    /// Test 401 after a token refresh surfaces as an auth error with remediation
    #[tokio::test]
    async fn test_401_is_auth_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"code": 401, "message": "Invalid credentials"}
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = client(&server, quiet_console(), &properties());
        let err = client
            .get(&format!("{}/compute/v1/projects/test-project", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Auth(_)));
        assert!(err.remediation().is_some());
    }

    /// Test 500 keeps the parsed server message
    #[tokio::test]
    async fn test_500_is_http_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": {"code": 500, "message": "Internal error"}
            })))
            .mount(&server)
            .await;

        let client = client(&server, quiet_console(), &properties());
        let err = client
            .get(&format!("{}/compute/v1/projects/test-project", server.uri()))
            .await
            .unwrap_err();
        let http = err.http().expect("HTTP error");
        assert_eq!(http.status, 500);
        assert_eq!(http.message, "Internal error");
    }

    /// Test malformed JSON is a serialization error
    #[tokio::test]
    async fn test_malformed_json() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{ invalid json }"))
            .mount(&server)
            .await;

        let client = client(&server, quiet_console(), &properties());
        let err = client
            .get(&format!("{}/compute/v1/projects/test-project", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Serialization(_)));
    }
}

/// The service auto-enable flow
mod enable_tests {
    use super::*;

    const DISABLED: &str =
        "Compute Engine API has not been used in project 12345 before or it is disabled. \
         Enable it by visiting https://console.developers.google.com/apis/api/compute.googleapis.com/overview?project=12345";

    fn disabled_response() -> ResponseTemplate {
        ResponseTemplate::new(403).set_body_json(json!({
            "error": {
                "code": 403,
                "message": DISABLED,
                "status": "PERMISSION_DENIED",
                "details": [{"reason": "SERVICE_DISABLED"}]
            }
        }))
    }

    /// Test an interactive yes enables the service and retries the call
    #[tokio::test]
    async fn test_prompt_yes_enables_and_retries() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/zones"))
            .respond_with(disabled_response())
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/serviceusage/v1/projects/12345/services/compute.googleapis.com:enable"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "operations/acf.enable-1",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/zones"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;

        let (console, output) = Console::captured(&["y".to_string()], true);
        let client = client(&server, console, &properties());
        let zones = client
            .get(&format!("{}/compute/v1/projects/test-project/zones", server.uri()))
            .await
            .expect("call should succeed after enabling");
        assert_eq!(zones, json!({"items": []}));

        let stderr = output.stderr.contents();
        assert!(stderr.contains("Enable API? (y/N)"), "{stderr}");
        assert!(stderr.contains("Enabling service [compute.googleapis.com] on project [12345]"));
    }

    /// Test a non-interactive session surfaces ServiceDisabled without enabling
    #[tokio::test]
    async fn test_no_prompt_surfaces_service_disabled() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(disabled_response())
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true})))
            .expect(0)
            .mount(&server)
            .await;

        let props = Properties {
            quiet: true,
            ..properties()
        };
        let client = client(&server, quiet_console(), &props);
        let err = client
            .get(&format!("{}/compute/v1/projects/test-project/zones", server.uri()))
            .await
            .unwrap_err();
        match err {
            CliError::ServiceDisabled { service, project, .. } => {
                assert_eq!(service, "compute.googleapis.com");
                assert_eq!(project, "12345");
            }
            other => panic!("Expected ServiceDisabled, got {other:?}"),
        }
    }

    /// Test prompting turned off enables implicitly, once per invocation
    #[tokio::test]
    async fn test_enable_attempted_once_per_service() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(disabled_response())
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/serviceusage/v1/projects/12345/services/compute.googleapis.com:enable"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "operations/acf.enable-1",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let props = Properties {
            quiet: true,
            should_prompt_to_enable_api: false,
            ..properties()
        };
        let client = client(&server, quiet_console(), &props);
        let url = format!("{}/compute/v1/projects/test-project/zones", server.uri());
        assert!(matches!(
            client.get(&url).await.unwrap_err(),
            CliError::ServiceDisabled { .. }
        ));
        assert!(matches!(
            client.get(&url).await.unwrap_err(),
            CliError::ServiceDisabled { .. }
        ));
    }
    /// Mount a disabled reply for the first GET of `route`, then a success
    async fn disabled_once(server: &MockServer, route: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(disabled_response())
            .up_to_n_times(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(server)
            .await;
    }

    /// Test an enable operation that is still running is polled before the retry
    #[tokio::test]
    async fn test_enable_polls_running_operation() {
        let server = MockServer::start().await;

        disabled_once(&server, "/compute/v1/projects/test-project/zones").await;
        Mock::given(method("POST"))
            .and(path("/serviceusage/v1/projects/12345/services/compute.googleapis.com:enable"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "operations/acf.enable-2",
                "done": false
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/serviceusage/v1/operations/acf.enable-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "operations/acf.enable-2",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let props = Properties {
            should_prompt_to_enable_api: false,
            ..properties()
        };
        let client = client(&server, quiet_console(), &props);
        let zones = client
            .get(&format!("{}/compute/v1/projects/test-project/zones", server.uri()))
            .await
            .expect("call should succeed once the enable operation finished");
        assert_eq!(zones, json!({"items": []}));
    }

    /// Test a failed enable operation surfaces its error code
    #[tokio::test]
    async fn test_enable_operation_error_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/zones"))
            .respond_with(disabled_response())
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "operations/acf.enable-3",
                "done": true,
                "error": {"code": 9, "message": "Billing must be enabled"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let props = Properties {
            should_prompt_to_enable_api: false,
            ..properties()
        };
        let client = client(&server, quiet_console(), &props);
        let err = client
            .get(&format!("{}/compute/v1/projects/test-project/zones", server.uri()))
            .await
            .unwrap_err();
        match err {
            CliError::OperationError { code, message, .. } => {
                assert_eq!(code, "9");
                assert_eq!(message, "Billing must be enabled");
            }
            other => panic!("Expected OperationError, got {other:?}"),
        }
    }

    /// Test a later request for an already-enabled service is retried, not failed
    #[tokio::test]
    async fn test_later_request_reuses_enable_outcome() {
        let server = MockServer::start().await;

        disabled_once(&server, "/compute/v1/projects/test-project/zones").await;
        disabled_once(&server, "/compute/v1/projects/test-project/regions").await;
        Mock::given(method("POST"))
            .and(path("/serviceusage/v1/projects/12345/services/compute.googleapis.com:enable"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "operations/acf.enable-1",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let props = Properties {
            should_prompt_to_enable_api: false,
            ..properties()
        };
        let client = client(&server, quiet_console(), &props);
        let zones = client
            .get(&format!("{}/compute/v1/projects/test-project/zones", server.uri()))
            .await;
        let regions = client
            .get(&format!("{}/compute/v1/projects/test-project/regions", server.uri()))
            .await;
        assert!(zones.is_ok(), "{zones:?}");
        assert!(regions.is_ok(), "{regions:?}");
    }

    /// Test concurrent requests wait for one enable and then all succeed
    #[tokio::test]
    async fn test_concurrent_requests_share_one_enable() {
        let server = MockServer::start().await;

        disabled_once(&server, "/compute/v1/projects/test-project/zones").await;
        disabled_once(&server, "/compute/v1/projects/test-project/regions").await;
        disabled_once(&server, "/compute/v1/projects/test-project/global/networks").await;
        Mock::given(method("POST"))
            .and(path("/serviceusage/v1/projects/12345/services/compute.googleapis.com:enable"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"name": "operations/acf.enable-1", "done": true}))
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let props = Properties {
            should_prompt_to_enable_api: false,
            ..properties()
        };
        let client = client(&server, quiet_console(), &props);
        let urls: Vec<String> = ["zones", "regions", "global/networks"]
            .iter()
            .map(|r| format!("{}/compute/v1/projects/test-project/{r}", server.uri()))
            .collect();
        let results = futures::future::join_all(urls.iter().map(|u| client.get(u))).await;
        for result in results {
            assert!(result.is_ok(), "{result:?}");
        }
    }

    /// Test a disabled-service slot of a batch goes through enable and is retried
    #[tokio::test]
    async fn test_batch_disabled_slot_is_recovered() {
        let server = MockServer::start().await;

        let forbidden = serde_json::to_string(&json!({
            "error": {"code": 403, "message": DISABLED, "status": "PERMISSION_DENIED"}
        }))
        .unwrap();
        let reply = format!(
            "--reply\r\n\
            Content-Type: application/http\r\n\
            Content-ID: <response-b+0>\r\n\r\n\
            HTTP/1.1 403 Forbidden\r\n\
            Content-Type: application/json\r\n\r\n\
            {forbidden}\r\n\
            --reply--\r\n"
        );
        Mock::given(method("POST"))
            .and(path("/batch/compute/v1"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(reply, "multipart/mixed; boundary=reply"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/serviceusage/v1/projects/12345/services/compute.googleapis.com:enable"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/compute/v1/projects/test-project/zones/z/instances/a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "op-a"})))
            .expect(1)
            .mount(&server)
            .await;

        let props = Properties {
            should_prompt_to_enable_api: false,
            ..properties()
        };
        let client = client(&server, quiet_console(), &props);
        let url = format!("{}/compute/v1/projects/test-project/zones/z/instances/a", server.uri());
        let requests = vec![BatchRequest::new(Method::Delete, &url, None)];
        let mut results = execute_batch(&client, &format!("{}/batch/compute/v1", server.uri()), &requests)
            .await
            .unwrap();
        let error = results.remove(0).unwrap_err();
        assert_eq!(error.status, 403);

        let operation = client
            .recover_disabled(Method::Delete, &url, None, error)
            .await
            .expect("slot should succeed after enabling");
        assert_eq!(operation["name"], "op-a");
    }
}

/// Batching and paging
mod collection_tests {
    use super::*;

    /// Test a batch reply is split back into per-request results
    #[tokio::test]
    async fn test_batch_results_in_request_order() {
        let server = MockServer::start().await;

        let reply = "--reply\r\n\
            Content-Type: application/http\r\n\
            Content-ID: <response-b+0>\r\n\r\n\
            HTTP/1.1 200 OK\r\n\
            Content-Type: application/json\r\n\r\n\
            {\"name\":\"op-a\"}\r\n\
            --reply\r\n\
            Content-Type: application/http\r\n\
            Content-ID: <response-b+1>\r\n\r\n\
            HTTP/1.1 404 Not Found\r\n\
            Content-Type: application/json\r\n\r\n\
            {\"error\":{\"code\":404,\"message\":\"not found\"}}\r\n\
            --reply--\r\n";
        Mock::given(method("POST"))
            .and(path("/batch/compute/v1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(reply, "multipart/mixed; boundary=reply"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, quiet_console(), &properties());
        let base = format!("{}/compute/v1/projects/test-project/zones/z/instances", server.uri());
        let requests = vec![
            BatchRequest::new(Method::Delete, &format!("{base}/a"), None),
            BatchRequest::new(Method::Delete, &format!("{base}/b"), None),
        ];
        let results = execute_batch(&client, &format!("{}/batch/compute/v1", server.uri()), &requests)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap()["name"], "op-a");
        assert_eq!(results[1].as_ref().unwrap_err().status, 404);
    }

    /// Test the pager follows nextPageToken and yields every item once
    #[tokio::test]
    async fn test_pager_walks_all_pages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/zones"))
            .and(query_param("pageToken", "t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"name": "c"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/zones"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"name": "a"}, {"name": "b"}],
                "nextPageToken": "t1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, quiet_console(), &properties());
        let mut request = ListRequest::new(
            &format!("{}/compute/v1/projects/test-project/zones", server.uri()),
            "items",
        );
        request.page_size_param = "maxResults".into();
        let items = pager::collect(&client, request, &Interrupt::new()).await.unwrap();
        let names: Vec<&str> = items.iter().filter_map(|i| i["name"].as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    /// Test the limit stops fetching once enough items were seen
    #[tokio::test]
    async fn test_pager_limit_skips_later_pages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/compute/v1/projects/test-project/zones"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"name": "a"}, {"name": "b"}],
                "nextPageToken": "t1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, quiet_console(), &properties());
        let mut request = ListRequest::new(
            &format!("{}/compute/v1/projects/test-project/zones", server.uri()),
            "items",
        );
        request.limit = Some(1);
        let items: Vec<_> = pager::items(&client, request, &Interrupt::new())
            .collect::<Vec<_>>()
            .await;
        assert_eq!(items.len(), 1);
    }
}

/// Operation polling
mod poller_tests {
    use super::*;
    use cloudctl::error::{EXIT_CANCELLED, EXIT_OPERATION_TIMEOUT};
    use cloudctl::resource::poller::OperationPoller;

    const OP_PATH: &str = "/compute/v1/projects/test-project/zones/z/operations/op-1";

    fn fast(max_wait: Duration) -> PollerConfig {
        PollerConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: 0.0,
            max_wait,
            ..PollerConfig::default()
        }
    }

    async fn running_then(server: &MockServer, polls: u64, last: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(OP_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "op-1",
                "status": "RUNNING"
            })))
            .up_to_n_times(polls)
            .expect(polls)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(OP_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(last))
            .expect(1)
            .mount(server)
            .await;
    }

    /// Test a finished operation yields its response
    #[tokio::test]
    async fn test_wait_returns_operation_response() {
        let server = MockServer::start().await;
        running_then(
            &server,
            2,
            json!({"name": "op-1", "done": true, "response": {"name": "vm-1", "status": "RUNNING"}}),
        )
        .await;

        let client = client(&server, quiet_console(), &properties());
        let url = format!("{}{OP_PATH}", server.uri());
        let resource = OperationPoller::new(&client, fast(Duration::from_secs(5)))
            .wait_for_resource(json!({"name": "op-1", "status": "RUNNING"}), &url, true, None)
            .await
            .unwrap();
        assert_eq!(resource, json!({"name": "vm-1", "status": "RUNNING"}));
    }

    /// Test an operation that ends in error raises OperationError with its code
    #[tokio::test]
    async fn test_wait_reports_operation_error() {
        let server = MockServer::start().await;
        running_then(
            &server,
            1,
            json!({
                "name": "op-1",
                "status": "DONE",
                "error": {"errors": [{"code": "QUOTA_EXCEEDED", "message": "Quota 'CPUS' exceeded"}]}
            }),
        )
        .await;

        let client = client(&server, quiet_console(), &properties());
        let url = format!("{}{OP_PATH}", server.uri());
        let err = OperationPoller::new(&client, fast(Duration::from_secs(5)))
            .wait(json!({"name": "op-1", "status": "PENDING"}), &url, None)
            .await
            .unwrap_err();
        match &err {
            CliError::OperationError { code, message, .. } => {
                assert_eq!(code, "QUOTA_EXCEEDED");
                assert_eq!(message, "Quota 'CPUS' exceeded");
            }
            other => panic!("Expected OperationError, got {other:?}"),
        }
        assert_eq!(err.exit_code(), 1);
    }

    /// Test an operation that never finishes times out with its own exit code
    #[tokio::test]
    async fn test_wait_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(OP_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "op-1",
                "status": "RUNNING"
            })))
            .mount(&server)
            .await;

        let client = client(&server, quiet_console(), &properties());
        let url = format!("{}{OP_PATH}", server.uri());
        let err = OperationPoller::new(&client, fast(Duration::from_millis(40)))
            .wait(json!({"name": "op-1", "status": "RUNNING"}), &url, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::OperationTimeout { .. }), "{err:?}");
        assert_eq!(err.exit_code(), EXIT_OPERATION_TIMEOUT);
    }

    /// Test an interrupt stops polling and reports the operation as still running
    #[tokio::test]
    async fn test_interrupt_cancels_wait() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "RUNNING"})))
            .expect(0)
            .mount(&server)
            .await;

        let (console, output) = Console::captured(&[], false);
        let client = client(&server, console, &properties());
        let interrupt = Interrupt::new();
        interrupt.trigger();
        let url = format!("{}{OP_PATH}", server.uri());
        let err = OperationPoller::new(&client, fast(Duration::from_secs(5)))
            .with_interrupt(&interrupt)
            .wait(json!({"name": "op-1", "status": "RUNNING"}), &url, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Cancelled(_)), "{err:?}");
        assert_eq!(err.exit_code(), EXIT_CANCELLED);
        assert!(output.stderr.contents().contains("Interrupted waiting for operation"));
    }
}
