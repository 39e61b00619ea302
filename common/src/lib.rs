//! Shared building blocks for the backend bridge.
//!
//! - `config`: environment driven service configuration
//! - `errors`: error taxonomy and HTTP mapping
//! - `middleware`: request id propagation
//! - `models`: bridge payloads, HTTP envelopes, session and query shapes
//! - `response`: unified `ApiResponse` wrapper

pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;

pub use errors::{AppError, AppResult};
