//! Operation Poller
//!
//! Waits on long-running operations with exponential backoff and returns the
//! resulting resource, the operation's error, or a timeout.

use super::reference::ResourceRef;
use super::registry::Registry;
use crate::error::{CliError, Result};
use crate::gcp::client::GcpClient;
use crate::invocation::Interrupt;
use crate::progress::ProgressTracker;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Backoff schedule and overall budget for one wait
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Fraction of each delay added or removed at random
    pub jitter: f64,
    pub max_wait: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 1.5,
            max_delay: Duration::from_secs(10),
            jitter: 0.1,
            max_wait: Duration::from_secs(crate::config::DEFAULT_POLL_MAX_WAIT_SECS),
        }
    }
}

impl PollerConfig {
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Un-jittered delay before poll number `attempt` (0-based)
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(64) as i32);
        let secs = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }

    /// Delay before poll number `attempt`, with jitter applied
    pub fn delay(&self, attempt: u32) -> Duration {
        self.jittered(self.base_delay(attempt))
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let sample = (uuid::Uuid::new_v4().as_u128() % 10_000) as f64 / 10_000.0;
        let factor = 1.0 + self.jitter * (2.0 * sample - 1.0);
        Duration::from_secs_f64((delay.as_secs_f64() * factor).max(0.0))
    }
}

/// True once the operation reached a terminal state
pub fn is_done(operation: &Value) -> bool {
    operation.get("done").and_then(|d| d.as_bool()).unwrap_or(false)
        || operation.get("status").and_then(|s| s.as_str()) == Some("DONE")
}

/// `(code, message)` of a failed operation
pub fn operation_error(operation: &Value) -> Option<(String, String)> {
    let error = operation.get("error")?;
    if let Some(errors) = error.get("errors").and_then(|e| e.as_array()) {
        let first = errors.first()?;
        let code = first.get("code").map(value_text).unwrap_or_default();
        let message = errors
            .iter()
            .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
            .collect::<Vec<_>>()
            .join("; ");
        return Some((code, message));
    }
    let code = error.get("code").map(value_text).unwrap_or_default();
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or_default()
        .to_string();
    Some((code, message))
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Relative name for messages: everything from `projects/` or `operations/` on
pub fn relative_name_of(url: &str) -> String {
    let url = url.split('?').next().unwrap_or(url);
    for marker in ["projects/", "operations/"] {
        if let Some(pos) = url.find(marker) {
            return url[pos..].to_string();
        }
    }
    url.to_string()
}

/// URL to poll for `operation`, which was returned by a method on `target`
pub fn operation_url(
    operation: &Value,
    registry: &Registry,
    target: Option<&ResourceRef>,
) -> Result<String> {
    if let Some(link) = operation.get("selfLink").and_then(|l| l.as_str()) {
        return Ok(link.to_string());
    }
    let name = operation
        .get("name")
        .and_then(|n| n.as_str())
        .ok_or_else(|| CliError::Serialization("Operation has no name".to_string()))?;

    let target = target.ok_or_else(|| {
        CliError::Internal(format!("Cannot locate operation [{name}] without a target"))
    })?;
    if name.contains('/') {
        return Ok(format!("{}{}", target.base_url, name));
    }

    let info = registry.collection(&target.collection, Some(&target.api_version))?;
    let operations = info
        .templates
        .iter()
        .find(|t| t.as_str() == target.template)
        .and_then(|t| t.operations.clone())
        .ok_or_else(|| {
            CliError::Internal(format!(
                "Collection [{}] has no operations collection",
                target.collection
            ))
        })?;

    let mut values: BTreeMap<String, String> = target.params.iter().cloned().collect();
    let op_info = registry.collection(&operations, Some(&target.api_version))?;
    let op_param = op_info
        .name_param()
        .ok_or_else(|| CliError::UnknownCollection(operations.clone()))?;
    values.insert(op_param.to_string(), name.to_string());
    Ok(registry
        .create(&operations, Some(&target.api_version), &values)?
        .self_link())
}

/// Polls one operation to completion
pub struct OperationPoller<'a> {
    client: &'a GcpClient,
    config: PollerConfig,
    interrupt: Option<Interrupt>,
}

impl<'a> OperationPoller<'a> {
    pub fn new(client: &'a GcpClient, config: PollerConfig) -> Self {
        Self {
            client,
            config,
            interrupt: None,
        }
    }

    pub fn with_interrupt(mut self, interrupt: &Interrupt) -> Self {
        self.interrupt = Some(interrupt.clone());
        self
    }


    /// Poll until done; returns the terminal operation or its error
    pub async fn wait(
        &self,
        operation: Value,
        poll_url: &str,
        mut tracker: Option<&mut ProgressTracker>,
    ) -> Result<Value> {
        let name = relative_name_of(poll_url);
        let started = Instant::now();
        let mut op = operation;
        let mut attempt = 0;

        loop {
            if let Some(tracker) = tracker.as_mut() {
                tracker.observe(&op);
            }
            if is_done(&op) {
                break;
            }

            if started.elapsed() >= self.config.max_wait {
                return Err(CliError::OperationTimeout {
                    operation: name,
                    waited_secs: started.elapsed().as_secs(),
                });
            }

            let remaining = self.config.max_wait.saturating_sub(started.elapsed());
            let delay = self.config.delay(attempt).min(remaining);
            attempt += 1;

            if self.sleep_or_interrupt(delay).await {
                self.client
                    .console()
                    .status(&format!("Interrupted waiting for operation [{name}]."));
                return Err(CliError::Cancelled(format!(
                    "Operation [{name}] is still running. Check it later with `describe`."
                )));
            }

            tracing::debug!("Polling {} (attempt {})", poll_url, attempt);
            op = self.client.get(poll_url).await?;
        }

        if let Some((code, message)) = operation_error(&op) {
            return Err(CliError::OperationError {
                operation: name,
                code,
                message,
            });
        }
        Ok(op)
    }

    /// Wait, then return the operation's response or the fetched target
    pub async fn wait_for_resource(
        &self,
        operation: Value,
        poll_url: &str,
        fetch_target: bool,
        tracker: Option<&mut ProgressTracker>,
    ) -> Result<Value> {
        let op = self.wait(operation, poll_url, tracker).await?;
        if let Some(response) = op.get("response") {
            return Ok(response.clone());
        }
        if fetch_target {
            if let Some(link) = op.get("targetLink").and_then(|l| l.as_str()) {
                return self.client.get(link).await;
            }
        }
        Ok(op)
    }

    /// True when interrupted before `delay` elapsed
    async fn sleep_or_interrupt(&self, delay: Duration) -> bool {
        let Some(interrupt) = &self.interrupt else {
            tokio::time::sleep(delay).await;
            return false;
        };
        if interrupt.is_triggered() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => interrupt.is_triggered(),
            _ = interrupt.triggered() => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backoff_schedule_caps() {
        let config = PollerConfig::default();
        assert_eq!(config.base_delay(0), Duration::from_secs(1));
        assert_eq!(config.base_delay(1), Duration::from_millis(1500));
        assert_eq!(config.base_delay(20), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let config = PollerConfig::default();
        for _ in 0..100 {
            let d = config.jittered(Duration::from_secs(10)).as_secs_f64();
            assert!((9.0..=11.0).contains(&d), "{d}");
        }
    }

    #[test]
    fn test_done_detection() {
        assert!(is_done(&json!({"done": true})));
        assert!(is_done(&json!({"status": "DONE"})));
        assert!(!is_done(&json!({"status": "RUNNING"})));
        assert!(!is_done(&json!({"name": "op-1", "done": false})));
    }

    #[test]
    fn test_operation_error_shapes() {
        let compute = json!({"error": {"errors": [{"code": "QUOTA_EXCEEDED", "message": "no cpus"}]}});
        assert_eq!(
            operation_error(&compute),
            Some(("QUOTA_EXCEEDED".into(), "no cpus".into()))
        );
        let rpc = json!({"done": true, "error": {"code": 7, "message": "denied"}});
        assert_eq!(operation_error(&rpc), Some(("7".into(), "denied".into())));
        assert_eq!(operation_error(&json!({"done": true})), None);
    }

    #[test]
    fn test_operation_url_from_target_scope() {
        let registry = Registry::global();
        let target = registry
            .parse(
                "projects/p/zones/us-west1-a/instances/foo",
                Some("compute.instances"),
                &BTreeMap::new(),
            )
            .unwrap();
        let url = operation_url(&json!({"name": "op-1", "done": false}), registry, Some(&target)).unwrap();
        assert_eq!(
            url,
            "https://compute.googleapis.com/compute/v1/projects/p/zones/us-west1-a/operations/op-1"
        );
        let link = operation_url(&json!({"name": "op-1", "selfLink": "https://x/op-1"}), registry, None).unwrap();
        assert_eq!(link, "https://x/op-1");
    }

    #[test]
    fn test_relative_name_of() {
        assert_eq!(
            relative_name_of("https://compute.googleapis.com/compute/v1/projects/p/zones/z/operations/op-1"),
            "projects/p/zones/z/operations/op-1"
        );
        assert_eq!(
            relative_name_of("https://serviceusage.googleapis.com/v1/operations/acf.1"),
            "operations/acf.1"
        );
    }
}
