//! Record and replay of command sessions
//!
//! - [`schema`] - The YAML scenario format
//! - [`capture`] - Recording a live session into that format
//! - [`replay`] - Running scenarios against a scripted transport

pub mod capture;
pub mod replay;
pub mod schema;

pub use replay::{ScenarioReport, ScenarioRunner};
pub use schema::Scenario;
