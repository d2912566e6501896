//! gcpkit library interface
//!
//! This crate is the shared authentication and request-shaping layer for
//! automation modules that drive Google Cloud resource APIs. It resolves one
//! of several credential kinds into a scoped, authenticated session and
//! normalizes user-supplied configuration trees before any API call is made.
//!
//! # Module Organization
//!
//! - [`errors`] - Error types (GcpError, Result)
//! - [`auth`] - Credential kinds, resolution, and token exchange
//! - [`client`] - Authenticated session over the blocking HTTP transport
//! - [`module`] - Argument contract: merged field specs and validation
//! - [`params`] - Tolerant path-directed configuration-tree rewriting

pub mod auth;
pub mod client;
pub mod errors;
pub mod module;
pub mod params;
