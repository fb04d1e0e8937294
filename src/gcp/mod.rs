//! GCP API interaction module
//!
//! This module provides the request pipeline for Google Cloud Platform REST
//! APIs: credentials, header composition, the swappable transport, batching
//! and the service auto-enable flow.
//!
//! # Module Structure
//!
//! - [`auth`] - Token sources and gcloud configuration lookup
//! - [`client`] - Main GCP client for making API requests
//! - [`http`] - Transport seam and `--log-http` rendering
//! - [`batch`] - `multipart/mixed` batch requests
//! - [`enable`] - Service-disabled detection and enablement
//!
//! # Example
//!
//! ```ignore
//! use cloudctl::gcp::client::GcpClient;
//!
//! async fn example(client: &GcpClient) -> cloudctl::error::Result<()> {
//!     let zones = client
//!         .get("https://compute.googleapis.com/compute/v1/projects/my-project/zones")
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod batch;
pub mod client;
pub mod enable;
pub mod http;
