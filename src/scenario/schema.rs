//! Scenario file format
//!
//! ```yaml
//! title: describe an instance
//! actions:
//! - execute_command:
//!     command: compute instances describe my-vm --zone us-west1-a
//!     events:
//!     - api_call:
//!         expect_request:
//!           uri: https://compute.googleapis.com/compute/v1/projects/fake-project/zones/us-west1-a/instances/my-vm
//!           method: GET
//!         return_response:
//!           status: 200
//!           body: {name: my-vm}
//!     - expect_stdout: "name: my-vm\n"
//!     - expect_exit:
//!         code: 0
//! ```

use crate::progress::{ProgressEvent, ProgressKind, ProgressStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

fn is_false(b: &bool) -> bool {
    !*b
}

fn default_status() -> u16 {
    200
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub actions: Vec<ScenarioAction>,
}

impl Scenario {
    pub fn from_yaml(content: &str) -> crate::error::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> crate::error::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioAction {
    ExecuteCommand(ExecuteCommand),
}

/// One command line and everything that happens while it runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteCommand {
    pub command: String,
    #[serde(default)]
    pub events: Vec<Event>,
}

impl ExecuteCommand {
    pub fn api_calls(&self) -> impl Iterator<Item = &ApiCall> {
        self.events.iter().filter_map(|e| match e {
            Event::ApiCall(call) => Some(call),
            _ => None,
        })
    }

    /// Scripted answers, in prompt order
    pub fn user_input(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::UserInput(lines) => Some(lines.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    ApiCall(ApiCall),
    ExpectStdout(OutputAssertion),
    ExpectStderr(OutputAssertion),
    UserInput(Vec<String>),
    #[serde(alias = "expect_exit_code")]
    ExpectExit(ExitExpectation),
    ExpectProgressBar(ProgressBarExpectation),
    ExpectProgressTracker(ProgressExpectation),
}

impl Event {
    /// Expectations are regenerated in update mode; calls and input are kept
    pub fn is_expectation(&self) -> bool {
        !matches!(self, Event::ApiCall(_) | Event::UserInput(_))
    }

    /// The expectation a finished tracker or bar is written as
    pub fn from_progress(event: &ProgressEvent) -> Self {
        match event.kind {
            ProgressKind::Bar => Event::ExpectProgressBar(ProgressBarExpectation {
                message: event.message.clone(),
            }),
            ProgressKind::Tracker => Event::ExpectProgressTracker(ProgressExpectation {
                message: event.message.clone(),
                status: Some(event.status),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCall {
    pub expect_request: ExpectedRequest,
    pub return_response: CannedResponse,
    /// May match any number of consecutive requests, at least one
    #[serde(default, skip_serializing_if = "is_false")]
    pub repeatable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedRequest {
    pub uri: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<ExpectedBody>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExpectedBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CannedResponse {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// JSON documents are sent serialized; strings are sent as they are
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl CannedResponse {
    pub fn body_text(&self) -> String {
        match &self.body {
            None => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(value) => value.to_string(),
        }
    }
}

/// Literal text, or one of the matcher forms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputAssertion {
    Literal(String),
    Matcher(Matcher),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Matcher {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<String>,
    /// Regular expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_none: Option<bool>,
    #[serde(default, rename = "in", skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitExpectation {
    pub code: i32,
    /// Substring of the error line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressExpectation {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProgressStatus>,
}

/// A progress bar shown on stderr, identified by its label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressBarExpectation {
    pub message: String,
}
