//! # HTTP Transport Client
//!
//! Asynchronous API client wrapped around `reqwest` and `reqwest-middleware`.
//! It joins paths onto the configured base URL, applies the request timeout,
//! runs the admin-key middleware, and turns every failure into a classified
//! [`ApiError`].
//!
//! Systemic failures (`Network`, and `Http` with status >= 500) are published on
//! the [`ErrorBus`] before being returned. Caller-local 4xx failures are only
//! returned.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::core::dispatcher::ErrorBus;
use crate::retrieve::admin_key::{AdminKeyMiddleware, CredentialProvider};
use crate::retrieve::api_error::ApiError;

/// Fixed request timeout of the scanner API.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Transport client for the scanner service.
///
/// Cheap to clone; clones share the connection pool and the error bus.
#[derive(Clone)]
pub struct ApiClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// Absolute base URL every path is appended to.
    base_url: Url,
    timeout: Duration,
    bus: ErrorBus,
}

impl ApiClient {
    /// Creates a client for `base_url`.
    ///
    /// `credentials` feeds the admin-key header on privileged paths; `bus`
    /// receives systemic failures.
    pub fn new(
        base_url: Url,
        timeout: Duration,
        credentials: Arc<dyn CredentialProvider>,
        bus: ErrorBus,
    ) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("scanner-dashboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        let client = ClientBuilder::new(http)
            .with(AdminKeyMiddleware::new(credentials))
            .build();

        Self {
            inner: client,
            base_url,
            timeout,
            bus,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn bus(&self) -> &ErrorBus {
        &self.bus
    }

    /// Resolves `path` against the base URL, keeping any base path prefix.
    pub fn url_for(&self, path: &str) -> Result<Url, ApiError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let joined = if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        };
        Url::parse(&joined).map_err(|e| {
            ApiError::network(format!("invalid request URL: {}", e), json!({ "url": joined }))
        })
    }

    /// Sends a request and returns the raw JSON body.
    pub async fn send<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Value, ApiError>
    where
        B: Serialize + ?Sized,
    {
        self.request(method, path, body).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request::<T, ()>(Method::GET, path, None).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::POST, path, Some(body)).await
    }

    /// Performs a request and deserializes the success body into `T`.
    ///
    /// A 2xx body that does not match `T` counts as a `Network` failure: no
    /// usable response was obtained.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let dispatched = self.dispatch(method.clone(), path, body);
        let outcome = match tokio::time::timeout(self.timeout, dispatched).await {
            Ok(Ok(value)) => serde_json::from_value::<T>(value).map_err(|e| {
                ApiError::network(
                    format!("unexpected response shape: {}", e),
                    json!({ "path": path }),
                )
            }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ApiError::network(
                format!("request timed out after {} ms", self.timeout.as_millis()),
                json!({ "path": path, "timeout": true }),
            )),
        };

        if let Err(err) = &outcome {
            self.report(&method, path, err);
        }
        outcome
    }

    fn report(&self, method: &Method, path: &str, err: &ApiError) {
        if err.is_systemic() {
            log::error!("{} {} failed: {}", method, path, err);
            self.bus.publish(err);
        } else {
            log::warn!("{} {} rejected: {}", method, path, err);
        }
    }

    async fn dispatch<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Value, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.url_for(path)?;
        let mut req = self.inner.request(method, url.clone());

        if let Some(b) = body {
            let json_body = serde_json::to_string(b).map_err(|e| {
                ApiError::network(
                    format!("could not encode request body: {}", e),
                    json!({ "url": url.as_str() }),
                )
            })?;
            req = req.header(CONTENT_TYPE, "application/json").body(json_body);
        }

        let response = req.send().await.map_err(|e| {
            ApiError::network(e.to_string(), json!({ "url": url.as_str(), "timeout": false }))
        })?;
        let status = response.status();
        let text = response.text().await.map_err(|e| {
            ApiError::network(
                format!("failed to read response body: {}", e),
                json!({ "url": url.as_str(), "status": status.as_u16() }),
            )
        })?;

        let parsed = parse_body(&text);
        if status.is_success() {
            parsed.map_err(|e| {
                ApiError::network(
                    format!("invalid JSON in response: {}", e),
                    json!({ "url": url.as_str(), "status": status.as_u16() }),
                )
            })
        } else {
            Err(ApiError::from_response(
                status.as_u16(),
                parsed.unwrap_or(Value::String(text)),
            ))
        }
    }
}

fn parse_body(text: &str) -> Result<Value, serde_json::Error> {
    if text.trim().is_empty() {
        Ok(Value::Null)
    } else {
        serde_json::from_str(text)
    }
}
