//! Service auto-enable
//!
//! Detects "API has not been used in project" responses and enables the
//! service through Service Usage.

use super::client::GcpClient;
use super::http::Method;
use crate::error::{CliError, HttpError, Result};
use crate::resource::poller::{is_done, operation_error, relative_name_of};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Instant;

/// A service reported disabled for a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisabledService {
    pub service: String,
    pub project: String,
}

impl DisabledService {
    pub fn into_error(self, error: &HttpError) -> CliError {
        CliError::ServiceDisabled {
            service: self.service,
            project: self.project,
            message: error.message.clone(),
        }
    }
}

fn disabled_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(\S+) has not been used in project (\S+?)\.? before or it is disabled").ok())
        .as_ref()
}

fn console_link_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"apis/api/([A-Za-z0-9.\-]+)/").ok())
        .as_ref()
}

/// Parse a service-disabled 403 into the service and project it names
pub fn service_disabled(error: &HttpError) -> Option<DisabledService> {
    if error.status != 403 {
        return None;
    }
    let captures = disabled_pattern()?.captures(&error.message)?;
    let named = captures.get(1)?.as_str();
    let project = captures.get(2)?.as_str();

    // Display names ("Compute Engine API") need the console link or the reason
    let service = if named.contains('.') {
        named.to_string()
    } else if let Some(link) = console_link_pattern()?.captures(&error.message) {
        link.get(1)?.as_str().to_string()
    } else if matches!(
        error.reason.as_deref(),
        Some("SERVICE_DISABLED") | Some("accessNotConfigured")
    ) {
        service_from_url(&error.url)?
    } else {
        return None;
    };

    Some(DisabledService {
        service,
        project: project.to_string(),
    })
}

/// `https://compute.googleapis.com/...` -> `compute.googleapis.com`
fn service_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    host.ends_with(".googleapis.com").then(|| host.to_string())
}

/// Enable `service` on `project` and wait for the enable operation
///
/// Calls here never re-enter the enable flow: a disabled Service Usage API
/// is reported as-is.
pub async fn enable_service(client: &GcpClient, project: &str, service: &str) -> Result<()> {
    let base = &client.settings().serviceusage_url;
    let url = format!(
        "{}projects/{}/services/{}:enable",
        base,
        urlencoding::encode(project),
        service
    );
    tracing::info!("Enabling {} on {}", service, project);

    let operation = client
        .request_without_enable(Method::Post, &url, Some(&serde_json::json!({})))
        .await?;

    let name = operation.get("name").and_then(|n| n.as_str()).unwrap_or_default();
    let poll_url = format!("{base}{name}");
    let config = &client.settings().enable_poll;
    let started = Instant::now();
    let mut op = operation;
    let mut attempt = 0;
    while !is_done(&op) {
        if started.elapsed() >= config.max_wait {
            return Err(CliError::OperationTimeout {
                operation: relative_name_of(&poll_url),
                waited_secs: started.elapsed().as_secs(),
            });
        }
        tokio::time::sleep(config.delay(attempt)).await;
        attempt += 1;
        op = client
            .request_without_enable(Method::Get, &poll_url, None)
            .await?;
    }

    if let Some((code, message)) = operation_error(&op) {
        return Err(CliError::OperationError {
            operation: relative_name_of(&poll_url),
            code,
            message,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forbidden(message: &str, reason: Option<&str>) -> HttpError {
        HttpError {
            status: 403,
            url: "https://compute.googleapis.com/compute/v1/projects/p/zones".into(),
            message: message.into(),
            status_name: Some("PERMISSION_DENIED".into()),
            reason: reason.map(str::to_string),
            body: String::new(),
        }
    }

    #[test]
    fn test_detects_disabled_service() {
        let err = forbidden(
            "compute.googleapis.com has not been used in project 12345 before or it is disabled. Enable it by visiting ...",
            None,
        );
        assert_eq!(
            service_disabled(&err),
            Some(DisabledService {
                service: "compute.googleapis.com".into(),
                project: "12345".into()
            })
        );
    }

    #[test]
    fn test_display_name_uses_console_link() {
        let msg = "Compute Engine API has not been used in project 12345 before or it is disabled. \
                   Enable it by visiting https://console.developers.google.com/apis/api/compute.googleapis.com/overview?project=12345";
        let found = service_disabled(&forbidden(msg, None)).unwrap();
        assert_eq!(found.service, "compute.googleapis.com");
        assert_eq!(found.project, "12345");
    }

    #[test]
    fn test_display_name_needs_reason() {
        let msg = "Compute has not been used in project 12345 before or it is disabled.";
        assert_eq!(service_disabled(&forbidden(msg, None)), None);
        let found = service_disabled(&forbidden(msg, Some("SERVICE_DISABLED"))).unwrap();
        assert_eq!(found.service, "compute.googleapis.com");
    }

    #[test]
    fn test_other_forbidden_is_not_disabled() {
        assert_eq!(service_disabled(&forbidden("Required 'compute.instances.list' permission", None)), None);
    }
}
