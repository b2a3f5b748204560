//! GitHub REST API client.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use crate::client::middleware::{AuthMiddleware, SharedToken};
use crate::config::GitHubConfig;
use crate::error::{AppError, Result};

const ACCEPT_GITHUB_JSON: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";

/// Repository owner as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubOwner {
    pub login: String,
}

/// Repository metadata for the repository picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubRepository {
    pub name: String,
    pub full_name: String,
    pub owner: GitHubOwner,
    pub private: bool,
    pub clone_url: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Client for the GitHub REST API.
pub struct GitHubClient {
    client: ClientWithMiddleware,
    base_url: Url,
    token: SharedToken,
}

impl GitHubClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let inner_client = Client::builder()
            .user_agent(format!("gitdeck/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let token: SharedToken = Arc::new(RwLock::new(None));
        let client = ClientBuilder::new(inner_client)
            .with(AuthMiddleware::new(Arc::clone(&token)))
            .build();

        Ok(Self {
            client,
            base_url: config.api_url.clone(),
            token,
        })
    }

    /// Sets the token used for subsequent requests.
    pub async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Repositories of the signed-in user, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotAuthenticated`] without a token and
    /// [`AppError::Unauthorized`] if GitHub rejects it.
    pub async fn list_repositories(&self) -> Result<Vec<GitHubRepository>> {
        if !self.is_authenticated().await {
            return Err(AppError::NotAuthenticated);
        }

        let mut url = self.base_url.join("user/repos")?;
        url.query_pairs_mut()
            .append_pair("sort", "updated")
            .append_pair("per_page", "100");

        let response = self
            .client
            .get(url)
            .header(http::header::ACCEPT, ACCEPT_GITHUB_JSON)
            .header(API_VERSION_HEADER, API_VERSION)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AppError::Unauthorized);
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let repositories: Vec<GitHubRepository> = response
            .json()
            .await
            .map_err(|e| AppError::Serialization(e.to_string()))?;
        debug!(count = repositories.len(), "Listed GitHub repositories");
        Ok(repositories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer, token: Option<&str>) -> GitHubClient {
        let config = GitHubConfig {
            api_url: Url::parse(&server.uri()).unwrap(),
            ..GitHubConfig::default()
        };
        let client = GitHubClient::new(&config).unwrap();
        client.set_token(token.map(String::from)).await;
        client
    }

    fn repository_json() -> serde_json::Value {
        json!({
            "name": "hello",
            "full_name": "octo/hello",
            "owner": { "login": "octo", "id": 1 },
            "private": true,
            "clone_url": "https://github.com/octo/hello.git",
            "language": "Rust",
            "description": null,
            "updated_at": "2024-05-01T12:00:00Z",
            "stargazers_count": 3
        })
    }

    #[tokio::test]
    async fn lists_repositories_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/repos"))
            .and(query_param("sort", "updated"))
            .and(query_param("per_page", "100"))
            .and(header("authorization", "Bearer gho_abc"))
            .and(header("accept", ACCEPT_GITHUB_JSON))
            .and(header("x-github-api-version", API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([repository_json()])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("gho_abc")).await;
        let repositories = client.list_repositories().await.unwrap();

        assert_eq!(repositories.len(), 1);
        let repo = &repositories[0];
        assert_eq!(repo.full_name, "octo/hello");
        assert_eq!(repo.owner.login, "octo");
        assert!(repo.private);
        assert_eq!(repo.language.as_deref(), Some("Rust"));
        assert_eq!(repo.description, None);
    }

    #[tokio::test]
    async fn unauthorized_maps_to_reauth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/repos"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("revoked")).await;
        let err = client.list_repositories().await.unwrap_err();

        assert!(matches!(err, AppError::Unauthorized));
        assert!(err.requires_reauth());
    }

    #[tokio::test]
    async fn other_failures_are_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/repos"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("gho_abc")).await;
        let err = client.list_repositories().await.unwrap_err();

        assert!(matches!(
            err,
            AppError::ApiError { status: 503, ref message } if message == "maintenance"
        ));
    }

    #[tokio::test]
    async fn requires_a_token() {
        let server = MockServer::start().await;
        let client = client_for(&server, None).await;

        assert!(matches!(
            client.list_repositories().await,
            Err(AppError::NotAuthenticated)
        ));
    }
}
