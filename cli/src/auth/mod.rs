//! Authentication for gitdeck.
//!
//! GitHub OAuth device flow login and token storage with a fallback tier.

pub mod credentials;
pub mod device_flow;
pub mod provider;
pub mod tokens;

pub use credentials::{CredentialStore, FileBackend, KeyringBackend, SecretBackend};
pub use device_flow::{
    DeviceAuthorization, DeviceFlowSequencer, DeviceFlowState, DeviceFlowTransport, PollResponse,
};
pub use provider::{GitHubDeviceFlow, OAuthProviderConfig};
pub use tokens::TokenSet;

use tracing::{info, warn};

use crate::error::Result;

/// Runs a full login: request a code, show it, poll, persist the token.
///
/// `on_code` is called once the code is known so the caller can print it.
/// With `launch_browser`, the verification page is opened as well.
pub async fn login<F>(
    sequencer: &DeviceFlowSequencer,
    store: &CredentialStore,
    launch_browser: bool,
    on_code: F,
) -> Result<TokenSet>
where
    F: FnOnce(&DeviceAuthorization, bool),
{
    let authorization = sequencer.request_code().await?;
    let opened = launch_browser && open_browser(&authorization);
    on_code(&authorization, opened);

    let token = sequencer.poll_until_complete().await?;
    store.save(&token)?;
    info!("Stored GitHub token");
    Ok(token)
}

/// Opens the verification page. Returns `false` if no browser could be started.
pub fn open_browser(authorization: &DeviceAuthorization) -> bool {
    match open::that(authorization.browser_url()) {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "Could not open browser");
            false
        },
    }
}
