//! # Transport Module
//!
//! Everything between the dashboard and the scanner service's HTTP surface.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: The `ApiClient`, built on `reqwest` and `reqwest-middleware`.
//!   It resolves paths against the configured base URL, bounds every request
//!   with a timeout and classifies every failure into an `ApiError`. Systemic
//!   failures are broadcast on the error bus before the error is returned.
//!
//! - **`api_error`**: The normalized error taxonomy shared by the transport,
//!   the cache and the error bus.
//!
//! - **`admin_key`**: Middleware that attaches the stored admin credential to
//!   privileged governance requests, and the provider trait it reads from.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

/// Credential injection for privileged endpoints.
pub mod admin_key;
/// Normalized transport errors.
pub mod api_error;
/// HTTP client with timeout, classification and error broadcasting.
pub mod ky_http;

pub use admin_key::{AdminKeyMiddleware, CredentialProvider, StaticCredential};
pub use api_error::{ApiError, ErrorEvent, ErrorKind};
pub use ky_http::ApiClient;
