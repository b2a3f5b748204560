//! Application context.
//!
//! Built once at startup and handed to every consumer by reference. It is
//! the only owner of the process-wide state: registry, cache, orchestrator,
//! credentials and the login sequencer.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::auth::{CredentialStore, DeviceFlowSequencer, DeviceFlowTransport, GitHubDeviceFlow};
use crate::cache::WorkingTreeCache;
use crate::client::GitHubClient;
use crate::config::AppConfig;
use crate::engine::{Git2Engine, GitEngine, RemoteCredentials};
use crate::error::{AppError, Result};
use crate::registry::{FileRegistryStore, RegistryStore, RepositoryRegistry};
use crate::sync::SyncOrchestrator;

/// Handles to the shared application state.
pub struct AppContext {
    pub config: AppConfig,
    pub engine: Arc<dyn GitEngine>,
    pub registry: Arc<RepositoryRegistry>,
    pub cache: Arc<WorkingTreeCache>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub credentials: Arc<CredentialStore>,
    pub github: Arc<GitHubClient>,
    login: Option<Arc<DeviceFlowSequencer>>,
}

impl AppContext {
    /// Production context: git2 engine, file registry, OS keyring.
    pub fn new(config: AppConfig) -> Result<Self> {
        let transport: Option<Arc<dyn DeviceFlowTransport>> =
            match GitHubDeviceFlow::new(&config.auth, &config.github) {
                Ok(flow) => Some(Arc::new(flow)),
                Err(AppError::Config(reason)) => {
                    debug!(%reason, "Device flow login unavailable");
                    None
                },
                Err(err) => return Err(err),
            };
        Self::with_parts(
            config,
            Arc::new(Git2Engine::new()),
            Box::new(FileRegistryStore::new()?),
            CredentialStore::new()?,
            transport,
        )
    }

    /// Context over caller-supplied collaborators.
    pub fn with_parts(
        config: AppConfig,
        engine: Arc<dyn GitEngine>,
        store: Box<dyn RegistryStore>,
        credentials: CredentialStore,
        transport: Option<Arc<dyn DeviceFlowTransport>>,
    ) -> Result<Self> {
        let registry = Arc::new(RepositoryRegistry::load(Arc::clone(&engine), store)?);
        let cache = Arc::new(WorkingTreeCache::new(
            Arc::clone(&engine),
            config.sync.commit_page_size,
        ));
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::clone(&engine),
            Arc::clone(&registry),
            Arc::clone(&cache),
            config.sync.clone(),
        ));
        let github = Arc::new(GitHubClient::new(&config.github)?);
        let login = transport.map(|transport| {
            Arc::new(DeviceFlowSequencer::new(
                transport,
                Duration::from_secs(config.auth.slow_down_increment_secs),
            ))
        });

        Ok(Self {
            config,
            engine,
            registry,
            cache,
            orchestrator,
            credentials: Arc::new(credentials),
            github,
            login,
        })
    }

    /// The login sequencer, if an OAuth client id is configured.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when login is not configured.
    pub fn login(&self) -> Result<&DeviceFlowSequencer> {
        self.login.as_deref().ok_or_else(|| {
            AppError::Config(
                "No OAuth client id configured. Set auth.client_id in config.toml or GITDECK_CLIENT_ID."
                    .to_string(),
            )
        })
    }

    /// Credentials for remote git operations from the stored token.
    ///
    /// Without a stored token, remotes are contacted anonymously (SSH agent
    /// or public HTTPS).
    pub fn remote_credentials(&self) -> Result<RemoteCredentials> {
        let token = self.credentials.get()?;
        Ok(RemoteCredentials::from_token(token.map(|t| t.access_token)))
    }

    /// Loads the stored token into the GitHub client.
    ///
    /// Returns `true` if a token was found.
    pub async fn authenticate_client(&self) -> Result<bool> {
        let token = self.credentials.get()?.map(|t| t.access_token);
        let found = token.is_some();
        self.github.set_token(token).await;
        Ok(found)
    }
}
