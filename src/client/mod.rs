//! Authenticated HTTP session over the blocking transport

pub mod session;

pub use session::{ApiResponse, AuthenticatedSession};
