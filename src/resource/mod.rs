//! Resource abstraction layer
//!
//! This module provides a data-driven approach to GCP resources. Collection
//! descriptors and message schemas are loaded from JSON files at compile
//! time, so new resource types are added without code changes.
//!
//! # Architecture
//!
//! - [`registry`] - Collection descriptors, URI templates, parse and create
//! - [`reference`] - Resolved resource references and scopes
//! - [`message`] - Typed message schemas behind the [`message::ApiMessage`] interface
//! - [`binder`] - Argument values to request message fields
//! - [`pager`] - `nextPageToken` walking as lazy streams
//! - [`poller`] - Long-running operation polling
//! - [`cache`] - TTL tables for scope listings
//!
//! # Definitions
//!
//! Embedded tables live under `src/resources/`:
//! - `collections.json` - APIs, endpoints and collection URI templates
//! - `messages.json` - Request and resource message schemas
//! - `commands.json` - The declarative command tree

pub mod binder;
pub mod cache;
pub mod message;
pub mod pager;
pub mod poller;
pub mod reference;
pub mod registry;

pub use reference::{ResourceRef, Scope};
pub use registry::Registry;
