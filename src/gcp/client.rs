//! GCP Client
//!
//! Main client for interacting with GCP APIs, combining authentication,
//! header composition and the HTTP transport. Also owns the service
//! auto-enable flow triggered by "API has not been used" 403 responses.

use super::auth::{CredentialKind, TokenSource};
use super::enable::{self, DisabledService};
use super::http::{format_request_log, format_response_log, HttpRequest, HttpResponse, Method, Transport};
use crate::config::{Properties, QuotaMode};
use crate::console::Console;
use crate::error::{CliError, HttpError, Result};
use crate::resource::poller::PollerConfig;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

type EnableOutcomes = Mutex<HashMap<(String, String), Arc<OnceCell<bool>>>>;

/// Header carrying the project billed for quota
pub const QUOTA_PROJECT_HEADER: &str = "X-Goog-User-Project";
pub const AUTHORITY_SELECTOR_HEADER: &str = "x-goog-iam-authority-selector";
pub const AUTHORIZATION_TOKEN_HEADER: &str = "x-goog-iam-authorization-token";

/// Default Service Usage endpoint used by the auto-enable flow
pub const SERVICEUSAGE_URL: &str = "https://serviceusage.googleapis.com/v1/";

/// Retry schedule after a service was enabled, while enablement propagates
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(20),
        }
    }
}

/// Everything the client needs from properties, resolved once per invocation
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub user_agent: String,
    pub quota_project: Option<String>,
    pub authority_selector: Option<String>,
    pub authorization_token_file: Option<PathBuf>,
    pub log_http: bool,
    pub should_prompt_to_enable_api: bool,
    pub prompts_allowed: bool,
    pub serviceusage_url: String,
    pub enable_retry: RetryPolicy,
    pub enable_poll: PollerConfig,
}

impl ClientSettings {
    pub fn from_properties(
        props: &Properties,
        kind: CredentialKind,
        command_path: &str,
        interactive: bool,
    ) -> Self {
        Self {
            user_agent: user_agent(command_path, interactive),
            quota_project: quota_project(props, kind),
            authority_selector: props.authority_selector.clone(),
            authorization_token_file: props.authorization_token_file.clone(),
            log_http: props.log_http,
            should_prompt_to_enable_api: props.should_prompt_to_enable_api,
            prompts_allowed: props.can_prompt(),
            serviceusage_url: props
                .api_endpoint_overrides
                .get("serviceusage")
                .cloned()
                .unwrap_or_else(|| SERVICEUSAGE_URL.to_string()),
            enable_retry: RetryPolicy::default(),
            enable_poll: PollerConfig::default(),
        }
    }
}

/// Compose the User-Agent for this invocation
pub fn user_agent(command_path: &str, interactive: bool) -> String {
    format!(
        "cloudctl/{} command/{} invocation-id/{} environment/None interactive/{} platform/{}-{}",
        crate::VERSION.replace(' ', "_"),
        if command_path.is_empty() { "cloudctl" } else { command_path },
        uuid::Uuid::new_v4().simple(),
        interactive,
        std::env::consts::OS,
        std::env::consts::ARCH,
    )
}

/// Decide the quota project header value
///
/// Only user credentials bill quota to a project: service accounts already
/// belong to one. The explicit billing project wins over the current project;
/// legacy mode never sends the header.
pub fn quota_project(props: &Properties, kind: CredentialKind) -> Option<String> {
    if !props.enable_resource_quota
        || kind == CredentialKind::ServiceAccount
        || props.quota_mode == QuotaMode::Legacy
    {
        return None;
    }
    props
        .billing_project
        .clone()
        .or_else(|| props.project.clone())
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn TokenSource>,
    settings: ClientSettings,
    console: Console,
    enable_attempts: EnableOutcomes,
}

/// Main GCP client
#[derive(Clone)]
pub struct GcpClient {
    inner: Arc<ClientInner>,
}

impl GcpClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn TokenSource>,
        settings: ClientSettings,
        console: Console,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport,
                credentials,
                settings,
                console,
                enable_attempts: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.inner.settings
    }

    pub fn console(&self) -> &Console {
        &self.inner.console
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str) -> Result<Value> {
        self.request(Method::Get, url, None).await
    }

    /// Make a POST request to a GCP API
    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        self.request(Method::Post, url, body).await
    }

    /// Make a PATCH request to a GCP API
    pub async fn patch(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        self.request(Method::Patch, url, body).await
    }

    /// Make a DELETE request to a GCP API
    pub async fn delete(&self, url: &str) -> Result<Value> {
        self.request(Method::Delete, url, None).await
    }

    /// JSON request with the service auto-enable flow
    pub async fn request(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
        let response = self.send_json(method, url, body).await?;
        if response.is_success() {
            return parse_body(&response);
        }
        let error = HttpError::from_response(response.status, url, &response.body);
        self.recover_disabled(method, url, body, error).await
    }

    /// Handle a failed call: enable the service it names, if any, and retry
    ///
    /// Errors that are not service-disabled come back mapped as usual. The
    /// enable itself runs once per (project, service); every caller that hit
    /// the same disabled service shares its outcome and retries.
    pub async fn recover_disabled(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        error: HttpError,
    ) -> Result<Value> {
        let Some(disabled) = enable::service_disabled(&error) else {
            return Err(CliError::from_http(error));
        };

        if !self.try_enable(&disabled).await? {
            return Err(disabled.into_error(&error));
        }

        let policy = &self.inner.settings.enable_retry;
        let mut delay = policy.initial_delay;
        for attempt in 1..=policy.attempts {
            let response = self.send_json(method, url, body).await?;
            if response.is_success() {
                return parse_body(&response);
            }
            let retry_error = HttpError::from_response(response.status, url, &response.body);
            if enable::service_disabled(&retry_error).is_none() {
                return Err(CliError::from_http(retry_error));
            }
            if attempt == policy.attempts {
                break;
            }
            tracing::info!(
                "Waiting for [{}] enablement to propagate (attempt {}/{})",
                disabled.service,
                attempt,
                policy.attempts
            );
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(policy.max_delay);
        }

        Err(disabled.into_error(&error))
    }

    /// JSON request that surfaces service-disabled errors as-is
    pub(crate) async fn request_without_enable(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        let response = self.send_json(method, url, body).await?;
        if response.is_success() {
            return parse_body(&response);
        }
        Err(CliError::from_http(HttpError::from_response(
            response.status,
            url,
            &response.body,
        )))
    }

    async fn send_json(&self, method: Method, url: &str, body: Option<&Value>) -> Result<HttpResponse> {
        let mut request = HttpRequest::new(method, url);
        if let Some(body) = body {
            request = request
                .header("Content-Type", "application/json")
                .body(serde_json::to_string(body)?);
        }
        self.execute(request).await
    }

    /// Send a raw request with auth and framework headers, refreshing the token once on 401
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let token = match self.inner.credentials.access_token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("Token unavailable ({}), refreshing", e);
                self.inner.credentials.refresh().await.map_err(|e| match e {
                    CliError::Auth(msg) => CliError::Auth(msg),
                    other => CliError::Auth(other.to_string()),
                })?
            }
        };

        let response = self.send_with_token(&request, &token.token).await?;
        if response.status != 401 {
            return Ok(response);
        }

        tracing::debug!("Got 401, refreshing token and retrying once");
        let token = self.inner.credentials.refresh().await?;
        let response = self.send_with_token(&request, &token.token).await?;
        if response.status == 401 {
            let error = HttpError::from_response(401, &request.url, &response.body);
            return Err(CliError::Auth(error.message));
        }
        Ok(response)
    }

    async fn send_with_token(&self, request: &HttpRequest, token: &str) -> Result<HttpResponse> {
        let request = self.compose_headers(request.clone(), token)?;
        let settings = &self.inner.settings;

        if settings.log_http {
            self.inner.console.write_err(&format_request_log(&request))?;
        }

        let started = Instant::now();
        let response = self.inner.transport.send(request.clone()).await?;

        if settings.log_http {
            self.inner
                .console
                .write_err(&format_response_log(&response, started.elapsed()))?;
        }
        if let Some(capturer) = self.inner.console.capturer() {
            capturer.record_api_call(&request, &response);
        }

        Ok(response)
    }

    fn compose_headers(&self, mut request: HttpRequest, token: &str) -> Result<HttpRequest> {
        let settings = &self.inner.settings;
        request = request
            .header("Authorization", &format!("Bearer {token}"))
            .header("User-Agent", &settings.user_agent);

        if let Some(project) = &settings.quota_project {
            request = request.header(QUOTA_PROJECT_HEADER, project);
        }
        if let Some(selector) = &settings.authority_selector {
            request = request.header(AUTHORITY_SELECTOR_HEADER, selector);
        }
        if let Some(path) = &settings.authorization_token_file {
            let value = std::fs::read_to_string(path).map_err(|e| {
                CliError::Auth(format!(
                    "Unable to read authorization token file [{}]: {e}",
                    path.display()
                ))
            })?;
            request = request.header(AUTHORIZATION_TOKEN_HEADER, value.trim());
        }
        Ok(request)
    }

    /// Run the enable flow once per (project, service); true when enabled
    ///
    /// Concurrent callers for the same key wait for the first one and share
    /// its outcome. Only the caller that ran the flow sees its error.
    async fn try_enable(&self, disabled: &DisabledService) -> Result<bool> {
        let cell = {
            let mut attempts = self
                .inner
                .enable_attempts
                .lock()
                .unwrap_or_else(|p| p.into_inner());
            attempts
                .entry((disabled.project.clone(), disabled.service.clone()))
                .or_default()
                .clone()
        };

        let mut failure = None;
        let failure_slot = &mut failure;
        let enabled = *cell
            .get_or_init(|| async move {
                match self.enable_once(disabled).await {
                    Ok(enabled) => enabled,
                    Err(e) => {
                        tracing::warn!("Enabling [{}] failed: {}", disabled.service, e);
                        *failure_slot = Some(e);
                        false
                    }
                }
            })
            .await;
        match failure {
            Some(e) => Err(e),
            None => Ok(enabled),
        }
    }

    async fn enable_once(&self, disabled: &DisabledService) -> Result<bool> {
        let settings = &self.inner.settings;
        let console = &self.inner.console;
        if settings.should_prompt_to_enable_api {
            if !settings.prompts_allowed || !console.is_interactive() {
                return Ok(false);
            }
            let message = format!(
                "API [{}] not enabled on project [{}]. Would you like to enable and retry (this will take a few minutes)?",
                disabled.service, disabled.project
            );
            if !console.prompt_continue(Some(&message), "Enable API", false)? {
                return Ok(false);
            }
        }

        console.status(&format!(
            "Enabling service [{}] on project [{}]...",
            disabled.service, disabled.project
        ));
        enable::enable_service(self, &disabled.project, &disabled.service).await?;
        Ok(true)
    }
}

fn parse_body(response: &HttpResponse) -> Result<Value> {
    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&response.body).map_err(CliError::from)
}
