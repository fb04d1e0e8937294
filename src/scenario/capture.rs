//! Session capture
//!
//! When `capture_session_file` is set, the console and the API client report
//! everything a command does here. The result is written in the scenario
//! format, so a captured session replays as a test.

use super::schema::{
    ApiCall, CannedResponse, Event, ExecuteCommand, ExitExpectation, ExpectedBody, ExpectedRequest,
    OutputAssertion, Scenario, ScenarioAction,
};
use crate::gcp::http::{HttpRequest, HttpResponse};
use crate::progress::ProgressEvent;
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// Request headers worth keeping; credentials never are
const RECORDED_HEADERS: [&str; 1] = ["x-goog-user-project"];

struct CaptureState {
    path: PathBuf,
    command: String,
    events: Vec<Event>,
}

#[derive(Clone)]
pub struct SessionCapturer {
    state: Arc<Mutex<CaptureState>>,
}

impl SessionCapturer {
    pub fn new(path: impl Into<PathBuf>, command: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(CaptureState {
                path: path.into(),
                command: command.to_string(),
                events: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn record_api_call(&self, request: &HttpRequest, response: &HttpResponse) {
        let headers: BTreeMap<String, String> = RECORDED_HEADERS
            .iter()
            .filter_map(|name| {
                request
                    .header_value(name)
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect();
        let body = request.body.as_ref().map(|body| match serde_json::from_str(body) {
            Ok(json) => ExpectedBody {
                json: Some(json),
                text: None,
            },
            Err(_) => ExpectedBody {
                json: None,
                text: Some(body.clone()),
            },
        });
        let response_body = if response.body.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str::<Value>(&response.body)
                    .unwrap_or_else(|_| Value::String(response.body.clone())),
            )
        };
        let response_headers: BTreeMap<String, String> = response
            .headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(name, value)| (name.to_lowercase(), value.clone()))
            .collect();

        self.lock().events.push(Event::ApiCall(ApiCall {
            expect_request: ExpectedRequest {
                uri: request.url.clone(),
                method: request.method.as_str().to_string(),
                headers,
                body,
            },
            return_response: CannedResponse {
                status: response.status,
                headers: response_headers,
                body: response_body,
            },
            repeatable: false,
        }));
    }

    pub fn record_stdout(&self, text: &str) {
        let mut state = self.lock();
        if let Some(Event::ExpectStdout(OutputAssertion::Literal(last))) = state.events.last_mut() {
            last.push_str(text);
            return;
        }
        state
            .events
            .push(Event::ExpectStdout(OutputAssertion::Literal(text.to_string())));
    }

    pub fn record_stderr(&self, text: &str) {
        let mut state = self.lock();
        if let Some(Event::ExpectStderr(OutputAssertion::Literal(last))) = state.events.last_mut() {
            last.push_str(text);
            return;
        }
        state
            .events
            .push(Event::ExpectStderr(OutputAssertion::Literal(text.to_string())));
    }

    pub fn record_user_input(&self, line: &str) {
        let mut state = self.lock();
        if let Some(Event::UserInput(lines)) = state.events.last_mut() {
            lines.push(line.to_string());
            return;
        }
        state.events.push(Event::UserInput(vec![line.to_string()]));
    }

    pub fn record_progress(&self, event: &ProgressEvent) {
        self.lock().events.push(Event::from_progress(event));
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    /// Append the finished command to the capture file
    pub fn finish(&self, code: i32, message: Option<&str>) -> Result<()> {
        let (path, action) = {
            let mut state = self.lock();
            let mut events = std::mem::take(&mut state.events);
            events.push(Event::ExpectExit(ExitExpectation {
                code,
                message: message.map(str::to_string),
            }));
            (
                state.path.clone(),
                ScenarioAction::ExecuteCommand(ExecuteCommand {
                    command: state.command.clone(),
                    events,
                }),
            )
        };

        let mut scenario = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Scenario::from_yaml(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Scenario::default()
        };
        scenario.actions.push(action);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, scenario.to_yaml()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Session captured to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcp::http::Method;

    #[test]
    fn test_capture_merges_output_and_drops_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.yaml");
        let capturer = SessionCapturer::new(&path, "compute zones list");

        let request = HttpRequest::new(Method::Get, "https://example.com/zones")
            .header("Authorization", "Bearer secret")
            .header("X-Goog-User-Project", "p");
        let response = HttpResponse {
            status: 200,
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: r#"{"items":[]}"#.into(),
        };
        capturer.record_api_call(&request, &response);
        capturer.record_stdout("a\n");
        capturer.record_stdout("b\n");
        capturer.record_user_input("y");
        capturer.finish(0, None).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("secret"));
        let scenario = Scenario::from_yaml(&content).unwrap();
        let ScenarioAction::ExecuteCommand(command) = &scenario.actions[0];
        assert_eq!(command.events.len(), 4);
        let call = command.api_calls().next().unwrap();
        assert_eq!(call.expect_request.headers.get("x-goog-user-project").map(String::as_str), Some("p"));
        assert_eq!(
            command.events[1],
            Event::ExpectStdout(OutputAssertion::Literal("a\nb\n".into()))
        );
    }

    #[test]
    fn test_finish_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.yaml");
        SessionCapturer::new(&path, "one").finish(0, None).unwrap();
        SessionCapturer::new(&path, "two").finish(1, Some("boom")).unwrap();
        let scenario = Scenario::from_yaml(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(scenario.actions.len(), 2);
    }
}
