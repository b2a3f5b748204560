//! GitHub device-flow endpoints.
//!
//! The device code request goes through the `oauth2` crate. Token polls are
//! issued one at a time with `reqwest` because the sequencer owns the poll
//! schedule and needs every `authorization_pending`/`slow_down` answer.

use std::time::Duration;

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, ClientId, DeviceAuthorizationUrl, RequestTokenError, Scope,
    StandardDeviceAuthorizationResponse, TokenUrl,
};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::auth::device_flow::{DeviceAuthorization, DeviceFlowTransport, PollResponse};
use crate::auth::tokens::TokenSet;
use crate::config::{AuthConfig, GitHubConfig};
use crate::error::{AppError, Result};

const AUTH_PATH: &str = "login/oauth/authorize";
const TOKEN_PATH: &str = "login/oauth/access_token";
const DEVICE_CODE_PATH: &str = "login/device/code";
const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// OAuth endpoints and client settings for one GitHub host.
#[derive(Debug, Clone)]
pub struct OAuthProviderConfig {
    pub client_id: ClientId,
    pub auth_url: AuthUrl,
    pub token_url: TokenUrl,
    pub device_auth_url: DeviceAuthorizationUrl,
    pub scopes: Vec<Scope>,
}

impl OAuthProviderConfig {
    /// Builds the configuration for the GitHub host at `web_url`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if no client id is configured.
    pub fn github(auth: &AuthConfig, web_url: &Url) -> Result<Self> {
        let client_id = auth
            .client_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                AppError::Config(
                    "No OAuth client id configured. Set auth.client_id in config.toml or GITDECK_CLIENT_ID."
                        .to_string(),
                )
            })?;

        Ok(Self {
            client_id: ClientId::new(client_id.to_string()),
            auth_url: AuthUrl::from_url(web_url.join(AUTH_PATH)?),
            token_url: TokenUrl::from_url(web_url.join(TOKEN_PATH)?),
            device_auth_url: DeviceAuthorizationUrl::from_url(web_url.join(DEVICE_CODE_PATH)?),
            scopes: auth.scopes.iter().cloned().map(Scope::new).collect(),
        })
    }

    /// OAuth2 client for this configuration. Device flow uses no secret.
    #[must_use]
    pub fn client(&self) -> BasicClient {
        BasicClient::new(
            self.client_id.clone(),
            None,
            self.auth_url.clone(),
            Some(self.token_url.clone()),
        )
        .set_device_authorization_url(self.device_auth_url.clone())
    }
}

/// Token endpoint answer; GitHub reports pending states as 200 with `error`.
#[derive(Debug, Deserialize)]
struct TokenPollBody {
    access_token: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
    interval: Option<u64>,
}

impl TokenPollBody {
    fn into_response(self) -> PollResponse {
        if let Some(token) = self.access_token {
            return PollResponse::Authorized(TokenSet::new(token).with_scope(self.scope));
        }
        match self.error.as_deref() {
            Some("authorization_pending") => PollResponse::AuthorizationPending,
            Some("slow_down") => PollResponse::SlowDown {
                interval: self.interval.map(Duration::from_secs),
            },
            Some("expired_token") => PollResponse::ExpiredToken,
            Some("access_denied") => PollResponse::AccessDenied,
            Some(code) => PollResponse::Error(
                self.error_description
                    .unwrap_or_else(|| code.to_string()),
            ),
            None => PollResponse::Error("token endpoint returned neither token nor error".to_string()),
        }
    }
}

/// [`DeviceFlowTransport`] against github.com or a GitHub Enterprise host.
pub struct GitHubDeviceFlow {
    config: OAuthProviderConfig,
    http: reqwest::Client,
}

impl GitHubDeviceFlow {
    pub fn new(auth: &AuthConfig, github: &GitHubConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("gitdeck/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(github.timeout_secs))
            .build()?;
        Ok(Self {
            config: OAuthProviderConfig::github(auth, &github.web_url)?,
            http,
        })
    }
}

#[async_trait]
impl DeviceFlowTransport for GitHubDeviceFlow {
    async fn request_code(&self) -> Result<DeviceAuthorization> {
        let client = self.config.client();
        let mut request = client
            .exchange_device_code()
            .map_err(|e| AppError::Config(format!("Device flow not supported: {e}")))?;
        for scope in &self.config.scopes {
            request = request.add_scope(scope.clone());
        }

        let response: StandardDeviceAuthorizationResponse = request
            .request_async(async_http_client)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(body) => {
                    AppError::AuthDenied(body.error().to_string())
                },
                other => AppError::TransportFailure(format!("Device authorization failed: {other}")),
            })?;

        Ok(DeviceAuthorization {
            device_code: response.device_code().secret().clone(),
            user_code: response.user_code().secret().clone(),
            verification_uri: response.verification_uri().to_string(),
            verification_uri_complete: response
                .verification_uri_complete()
                .map(|u| u.secret().clone()),
            expires_in: response.expires_in(),
            interval: response.interval(),
        })
    }

    async fn poll(&self, device_code: &str) -> Result<PollResponse> {
        let response = self
            .http
            .post(self.config.token_url.url().clone())
            .header(ACCEPT, "application/json")
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("device_code", device_code),
                ("grant_type", DEVICE_GRANT_TYPE),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        match serde_json::from_str::<TokenPollBody>(&body) {
            Ok(parsed) => {
                let outcome = parsed.into_response();
                debug!(
                    status = status.as_u16(),
                    authorized = matches!(outcome, PollResponse::Authorized(_)),
                    "Token poll answered"
                );
                Ok(outcome)
            },
            Err(_) if !status.is_success() => Err(AppError::ApiError {
                status: status.as_u16(),
                message: body,
            }),
            Err(e) => Err(AppError::Serialization(format!("unexpected token response: {e}"))),
        }
    }
}
