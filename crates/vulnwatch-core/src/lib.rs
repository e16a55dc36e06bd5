//! vulnwatch-core — shared library for the vulnwatch exporter.
//!
//! Provides:
//! - `model` — wire types for the Snyk v1 REST API
//! - `client` — authenticated API access and transport-error classification
//! - `aggregate` — dedup and grouping of findings into counted rows
//! - `store` — published metric snapshot shared with the scrape endpoint
//! - `poll` — the recurring organizations → projects → issues sweep
//!
//! Data flow: `poll` drives `client` per organization/project, pushes raw
//! issues through `aggregate`, and swaps the result into `store`, which the
//! binary exposes over HTTP.

pub mod aggregate;
pub mod client;
pub mod model;
pub mod poll;
pub mod store;

/// Version string reported by the binary: crate version plus short git SHA.
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "+", env!("GIT_SHA"));
