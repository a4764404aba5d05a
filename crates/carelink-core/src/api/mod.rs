//! REST client for the portal backend.
//!
//! `ApiClient` attaches the cached bearer token, refreshes it through the
//! single-flight coordinator on 401 and retries once, honors `retry-after`
//! on 429 once, and retries GETs on connection failures.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
