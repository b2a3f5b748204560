//! Authentication middleware for injecting Bearer tokens.

use std::sync::Arc;

use async_trait::async_trait;
use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result};
use tokio::sync::RwLock;

/// Shared slot holding the current GitHub token, if signed in.
pub type SharedToken = Arc<RwLock<Option<String>>>;

/// Middleware that injects the Bearer token into requests.
pub struct AuthMiddleware {
    token: SharedToken,
}

impl AuthMiddleware {
    #[must_use]
    pub const fn new(token: SharedToken) -> Self {
        Self { token }
    }
}

#[async_trait]
impl Middleware for AuthMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        if let Some(token) = self.token.read().await.as_deref() {
            if let Ok(value) = format!("Bearer {token}").parse() {
                req.headers_mut().insert(http::header::AUTHORIZATION, value);
            }
        }

        next.run(req, extensions).await
    }
}
