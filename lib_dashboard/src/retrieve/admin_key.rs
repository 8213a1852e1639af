//! Privileged-path credential injection.
//!
//! Requests whose path contains [`PRIVILEGED_PATH`] get an `X-Admin-Key` header
//! when the credential provider has a value. No credential means the request is
//! sent as-is and the service decides whether to reject it.

use std::sync::Arc;

use async_trait::async_trait;
use http::Extensions;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result};

/// Lowercase wire name of the admin credential header.
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";
/// Any path containing this segment is privileged.
pub const PRIVILEGED_PATH: &str = "/api/governance";

/// Supplies the optional admin credential at request time.
pub trait CredentialProvider: Send + Sync {
    fn get_credential(&self) -> Option<String>;
}

/// A fixed credential, or none at all.
#[derive(Debug, Clone, Default)]
pub struct StaticCredential(pub Option<String>);

impl CredentialProvider for StaticCredential {
    fn get_credential(&self) -> Option<String> {
        self.0.clone()
    }
}

pub fn is_privileged(path: &str) -> bool {
    path.contains(PRIVILEGED_PATH)
}

/// `reqwest-middleware` layer that attaches the admin key to privileged requests.
pub struct AdminKeyMiddleware {
    provider: Arc<dyn CredentialProvider>,
}

impl AdminKeyMiddleware {
    pub fn new(provider: Arc<dyn CredentialProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Middleware for AdminKeyMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        if is_privileged(req.url().path()) {
            match self.provider.get_credential() {
                Some(key) => match HeaderValue::from_str(&key) {
                    Ok(value) => {
                        req.headers_mut()
                            .insert(HeaderName::from_static(ADMIN_KEY_HEADER), value);
                    }
                    Err(_) => log::warn!("Stored admin key is not a valid header value"),
                },
                None => log::debug!("No admin key configured for {}", req.url().path()),
            }
        }
        next.run(req, extensions).await
    }
}
