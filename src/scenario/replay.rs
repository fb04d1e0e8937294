//! Scenario replay
//!
//! Each `execute_command` runs against a transport that answers from the
//! scripted `api_call` events, in order, and fails on anything unexpected.
//! Output is then checked against the `expect_*` events. In update mode the
//! expectations are rewritten from what the command actually did.

use super::schema::{
    ApiCall, Event, ExecuteCommand, ExitExpectation, OutputAssertion, ProgressBarExpectation,
    ProgressExpectation, Scenario, ScenarioAction,
};
use crate::config::Properties;
use crate::console::Console;
use crate::error::{CliError, Result};
use crate::gcp::auth::{CredentialKind, StaticToken};
use crate::gcp::http::{HttpRequest, HttpResponse, Transport};
use crate::invocation::Interrupt;
use crate::progress::{ProgressEvent, ProgressKind};
use crate::resource::poller::PollerConfig;
use crate::RunContext;
use futures::future::BoxFuture;
use regex::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Environment variable that switches replay into update mode
pub const UPDATE_ENV: &str = "CLOUDCTL_UPDATE_SCENARIOS";

/// Project used when a scenario does not configure one
pub const DEFAULT_PROJECT: &str = "fake-project";

struct TransportState {
    calls: Vec<ApiCall>,
    next: usize,
    hits: Vec<usize>,
    failures: Vec<String>,
}

/// Answers requests from the scripted calls of one command
pub struct ScenarioTransport {
    state: Mutex<TransportState>,
}

impl ScenarioTransport {
    pub fn new(calls: Vec<ApiCall>) -> Self {
        let hits = vec![0; calls.len()];
        Self {
            state: Mutex::new(TransportState {
                calls,
                next: 0,
                hits,
                failures: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn respond(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut state = self.lock();
        while state.next < state.calls.len() {
            let index = state.next;
            let call = &state.calls[index];
            let repeatable = call.repeatable;
            if let Err(mismatch) = request_matches(call, request) {
                if repeatable && state.hits[index] > 0 {
                    state.next += 1;
                    continue;
                }
                let message = format!(
                    "Unexpected request [{} {}]: {}",
                    request.method.as_str(),
                    request.url,
                    mismatch
                );
                state.failures.push(message.clone());
                return Err(CliError::Internal(message));
            }
            let response = HttpResponse {
                status: call.return_response.status,
                headers: call
                    .return_response
                    .headers
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                body: call.return_response.body_text(),
            };
            state.hits[index] += 1;
            if !repeatable {
                state.next += 1;
            }
            return Ok(response);
        }
        let message = format!(
            "Unexpected request [{} {}]: no more calls were expected",
            request.method.as_str(),
            request.url
        );
        state.failures.push(message.clone());
        Err(CliError::Internal(message))
    }

    /// Mismatches plus scripted calls that never happened
    pub fn failures(&self) -> Vec<String> {
        let state = self.lock();
        let mut failures = state.failures.clone();
        for (call, hits) in state.calls.iter().zip(&state.hits) {
            if *hits == 0 {
                failures.push(format!(
                    "Expected request was not made: [{} {}]",
                    call.expect_request.method, call.expect_request.uri
                ));
            }
        }
        failures
    }
}

impl Transport for ScenarioTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
        let response = self.respond(&request);
        Box::pin(async move { response })
    }
}

/// Compare URLs ignoring query parameter order
fn same_uri(expected: &str, actual: &str) -> bool {
    match (url::Url::parse(expected), url::Url::parse(actual)) {
        (Ok(expected), Ok(actual)) => {
            let query = |u: &url::Url| {
                let mut pairs: Vec<(String, String)> = u.query_pairs().into_owned().collect();
                pairs.sort();
                pairs
            };
            expected.scheme() == actual.scheme()
                && expected.host_str() == actual.host_str()
                && expected.port_or_known_default() == actual.port_or_known_default()
                && expected.path() == actual.path()
                && query(&expected) == query(&actual)
        }
        _ => expected == actual,
    }
}

fn request_matches(call: &ApiCall, request: &HttpRequest) -> std::result::Result<(), String> {
    let expected = &call.expect_request;
    if !expected.method.eq_ignore_ascii_case(request.method.as_str()) || !same_uri(&expected.uri, &request.url) {
        return Err(format!("expected [{} {}]", expected.method, expected.uri));
    }
    for (name, value) in &expected.headers {
        if request.header_value(name) != Some(value.as_str()) {
            return Err(format!(
                "header [{name}] is {:?}, expected {value:?}",
                request.header_value(name)
            ));
        }
    }
    let Some(body) = &expected.body else {
        return Ok(());
    };
    let actual = request.body.as_deref().unwrap_or_default();
    if let Some(json) = &body.json {
        let parsed: Value = serde_json::from_str(actual)
            .map_err(|_| format!("body is not JSON: {actual}"))?;
        if parsed != *json {
            return Err(format!("body {parsed} does not match expected {json}"));
        }
    }
    if let Some(text) = &body.text {
        if actual != text {
            return Err(format!("body {actual:?} does not match expected {text:?}"));
        }
    }
    Ok(())
}

/// Check ordered assertions against `actual`; stdout assertions are anchored
fn check_output(
    stream: &str,
    actual: &str,
    assertions: &[&OutputAssertion],
    anchored: bool,
    failures: &mut Vec<String>,
) {
    let mut cursor = 0usize;
    for assertion in assertions {
        let remaining = &actual[cursor..];
        let literal = |text: &str| -> Option<usize> {
            if anchored {
                remaining.starts_with(text).then_some(text.len())
            } else {
                remaining.find(text).map(|at| at + text.len())
            }
        };
        let advanced = match assertion {
            OutputAssertion::Literal(text) => literal(text),
            OutputAssertion::Matcher(m) => {
                if let Some(text) = &m.equals {
                    literal(text)
                } else if let Some(pattern) = &m.matches {
                    let pattern = if anchored {
                        format!("^(?:{pattern})")
                    } else {
                        pattern.clone()
                    };
                    match Regex::new(&pattern) {
                        Ok(re) => re.find(remaining).map(|found| found.end()),
                        Err(e) => {
                            failures.push(format!("Invalid {stream} pattern: {e}"));
                            continue;
                        }
                    }
                } else if m.is_none == Some(true) {
                    remaining.trim().is_empty().then_some(remaining.len())
                } else if let Some(options) = &m.one_of {
                    options.iter().find_map(|o| literal(o))
                } else {
                    Some(0)
                }
            }
        };
        match advanced {
            Some(n) => cursor += n,
            None => {
                failures.push(format!(
                    "{stream} did not match {assertion:?}; remaining output was:\n{remaining}"
                ));
                return;
            }
        }
    }
    if anchored && cursor < actual.len() {
        failures.push(format!("Unexpected {stream}:\n{}", &actual[cursor..]));
    }
}

fn check_progress(
    expected: &[&ProgressExpectation],
    bars: &[&ProgressBarExpectation],
    actual: &[ProgressEvent],
    failures: &mut Vec<String>,
) {
    let mut shown = actual.iter().filter(|e| e.kind == ProgressKind::Bar);
    for expectation in bars {
        if !shown.any(|e| e.message.starts_with(&expectation.message)) {
            failures.push(format!("Progress bar not seen: {expectation:?}"));
        }
    }

    let mut events = actual.iter().filter(|e| e.kind == ProgressKind::Tracker);
    for expectation in expected {
        let found = events.any(|e| {
            e.message.starts_with(&expectation.message)
                && expectation.status.map_or(true, |s| s == e.status)
        });
        if !found {
            failures.push(format!("Progress tracker not seen: {expectation:?}"));
        }
    }
}

/// What one command produced
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub progress: Vec<ProgressEvent>,
    pub failures: Vec<String>,
}

/// Result of replaying a whole scenario
#[derive(Debug, Clone, Default)]
pub struct ScenarioReport {
    pub outcomes: Vec<CommandOutcome>,
    pub updated: bool,
}

impl ScenarioReport {
    pub fn failures(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .flat_map(|o| o.failures.iter().map(move |f| format!("[{}] {}", o.command, f)))
            .collect()
    }

    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.failures.is_empty())
    }
}

pub struct ScenarioRunner {
    scenario: Scenario,
    path: Option<PathBuf>,
    properties: Properties,
    update: bool,
}

impl ScenarioRunner {
    pub fn new(scenario: Scenario) -> Self {
        let properties = Properties {
            project: Some(DEFAULT_PROJECT.to_string()),
            check_gce_metadata: false,
            ..Properties::default()
        };
        Self {
            scenario,
            path: None,
            properties,
            update: false,
        }
    }

    /// Load a scenario file; update mode follows [`UPDATE_ENV`]
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut runner = Self::new(Scenario::from_yaml(&content)?);
        runner.path = Some(path.to_path_buf());
        runner.update = std::env::var(UPDATE_ENV).is_ok_and(|v| v == "1" || v == "true");
        Ok(runner)
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub async fn run(&mut self) -> Result<ScenarioReport> {
        let mut report = ScenarioReport::default();
        let mut rewritten = Vec::with_capacity(self.scenario.actions.len());
        for action in &self.scenario.actions {
            let ScenarioAction::ExecuteCommand(command) = action;
            let outcome = self.execute(command).await?;
            if self.update {
                rewritten.push(ScenarioAction::ExecuteCommand(updated_command(command, &outcome)));
            }
            report.outcomes.push(outcome);
        }

        if self.update {
            self.scenario.actions = rewritten;
            if let Some(path) = &self.path {
                std::fs::write(path, self.scenario.to_yaml()?)?;
                tracing::info!("Updated scenario {}", path.display());
            }
            report.updated = true;
        }
        Ok(report)
    }

    async fn execute(&self, command: &ExecuteCommand) -> Result<CommandOutcome> {
        let argv = shell_words::split(&command.command)
            .map_err(|e| CliError::usage(format!("Invalid scenario command [{}]: {e}", command.command)))?;
        let input = command.user_input();
        let (console, output) = Console::captured(&input, !input.is_empty());
        let transport = Arc::new(ScenarioTransport::new(command.api_calls().cloned().collect()));
        let cache_dir = std::env::temp_dir().join(format!("cloudctl-scenario-{}", uuid::Uuid::new_v4()));

        let ctx = RunContext {
            properties: self.properties.clone(),
            console: console.clone(),
            transport: transport.clone(),
            credentials: Some(Arc::new(StaticToken::new("fake-token", CredentialKind::User))),
            poller: Some(PollerConfig {
                initial_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
                jitter: 0.0,
                ..PollerConfig::default()
            }),
            cache_dir: Some(cache_dir.clone()),
            interrupt: Interrupt::new(),
        };
        let exit_code = crate::run(ctx, &argv).await;
        let _ = std::fs::remove_dir_all(&cache_dir);

        let stdout = output.stdout.contents();
        let stderr = output.stderr.contents();
        let progress = console.progress_events();
        let mut failures = transport.failures();
        if !self.update {
            check_expectations(command, exit_code, &stdout, &stderr, &progress, &mut failures);
        }
        Ok(CommandOutcome {
            command: command.command.clone(),
            exit_code,
            stdout,
            stderr,
            progress,
            failures,
        })
    }
}

fn check_expectations(
    command: &ExecuteCommand,
    exit_code: i32,
    stdout: &str,
    stderr: &str,
    progress: &[ProgressEvent],
    failures: &mut Vec<String>,
) {
    let mut out = Vec::new();
    let mut err = Vec::new();
    let mut trackers = Vec::new();
    let mut bars = Vec::new();
    let mut exit: Option<&ExitExpectation> = None;
    for event in &command.events {
        match event {
            Event::ExpectStdout(a) => out.push(a),
            Event::ExpectStderr(a) => err.push(a),
            Event::ExpectProgressTracker(p) => trackers.push(p),
            Event::ExpectProgressBar(b) => bars.push(b),
            Event::ExpectExit(e) => exit = Some(e),
            Event::ApiCall(_) | Event::UserInput(_) => {}
        }
    }
    check_output("stdout", stdout, &out, true, failures);
    check_output("stderr", stderr, &err, false, failures);
    check_progress(&trackers, &bars, progress, failures);

    let expected_code = exit.map_or(0, |e| e.code);
    if exit_code != expected_code {
        failures.push(format!(
            "Exit code was {exit_code}, expected {expected_code}; stderr:\n{stderr}"
        ));
    }
    if let Some(message) = exit.and_then(|e| e.message.as_deref()) {
        if !stderr.contains(message) {
            failures.push(format!("Error message {message:?} not found in stderr:\n{stderr}"));
        }
    }
}

/// The scripted calls and input, followed by the observed behavior
fn updated_command(command: &ExecuteCommand, outcome: &CommandOutcome) -> ExecuteCommand {
    let mut events: Vec<Event> = command
        .events
        .iter()
        .filter(|e| !e.is_expectation())
        .cloned()
        .collect();
    events.extend(outcome.progress.iter().map(Event::from_progress));
    if !outcome.stdout.is_empty() {
        events.push(Event::ExpectStdout(OutputAssertion::Literal(outcome.stdout.clone())));
    }
    if !outcome.stderr.is_empty() {
        events.push(Event::ExpectStderr(OutputAssertion::Literal(outcome.stderr.clone())));
    }
    events.push(Event::ExpectExit(ExitExpectation {
        code: outcome.exit_code,
        message: None,
    }));
    ExecuteCommand {
        command: command.command.clone(),
        events,
    }
}
