//! Secure credential storage with a file fallback.
//!
//! The token lives in the operating system keyring:
//! - macOS: Keychain
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - Windows: Credential Manager
//!
//! When the keyring is unavailable (headless Linux, locked keychain) the
//! token is kept in a user-only file under the data directory instead.
//! Callers never see which tier answered.

use std::fs;
use std::path::PathBuf;

use keyring::Entry;
use tracing::{debug, warn};

use crate::auth::tokens::TokenSet;
use crate::config::paths::fallback_token_file;
use crate::error::{AppError, Result};

const SERVICE_NAME: &str = "dev.gitdeck.cli";
const CREDENTIALS_KEY: &str = "github_token";

/// One storage tier holding an opaque secret string.
pub trait SecretBackend: Send + Sync {
    /// Human-readable tier name for logs.
    fn name(&self) -> &'static str;

    fn get(&self) -> Result<Option<String>>;

    fn set(&self, secret: &str) -> Result<()>;

    /// Removes the secret. Missing secrets are not an error.
    fn delete(&self) -> Result<()>;
}

/// OS keyring tier.
pub struct KeyringBackend {
    entry: Entry,
}

impl KeyringBackend {
    /// # Errors
    ///
    /// Returns [`AppError::CredentialStorage`] if the keyring entry cannot be created,
    /// which may occur if the keyring service is unavailable or locked.
    pub fn new() -> Result<Self> {
        let entry = Entry::new(SERVICE_NAME, CREDENTIALS_KEY)?;
        Ok(Self { entry })
    }
}

impl SecretBackend for KeyringBackend {
    fn name(&self) -> &'static str {
        "keyring"
    }

    fn get(&self) -> Result<Option<String>> {
        match self.entry.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, secret: &str) -> Result<()> {
        self.entry.set_password(secret)?;
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Plain file tier, readable by the current user only.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be determined.
    pub fn new() -> Result<Self> {
        Ok(Self::with_path(fallback_token_file()?))
    }

    #[must_use]
    pub const fn with_path(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SecretBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn get(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(secret) => Ok(Some(secret)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::CredentialStorage(e.to_string())),
        }
    }

    fn set(&self, secret: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, secret)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::CredentialStorage(e.to_string())),
        }
    }
}

/// Stand-in primary tier for a keyring that could not be opened.
///
/// Holds nothing and refuses writes, so every save lands in the fallback.
struct UnavailableBackend {
    reason: String,
}

impl SecretBackend for UnavailableBackend {
    fn name(&self) -> &'static str {
        "keyring"
    }

    fn get(&self) -> Result<Option<String>> {
        Ok(None)
    }

    fn set(&self, _secret: &str) -> Result<()> {
        Err(AppError::CredentialStorage(self.reason.clone()))
    }

    fn delete(&self) -> Result<()> {
        Ok(())
    }
}

fn keyring_tier(keyring: Result<KeyringBackend>) -> Box<dyn SecretBackend> {
    match keyring {
        Ok(keyring) => Box::new(keyring),
        Err(err) => {
            warn!(error = %err, "OS keyring unavailable; using file storage");
            Box::new(UnavailableBackend {
                reason: err.to_string(),
            })
        },
    }
}

/// Token storage over a primary and a fallback tier.
///
/// `save` prefers the primary tier and falls back silently; `get` consults
/// the primary first and then the fallback; `delete` clears both and only
/// reports a failure if the token could still be found afterwards.
pub struct CredentialStore {
    primary: Box<dyn SecretBackend>,
    fallback: Box<dyn SecretBackend>,
}

impl CredentialStore {
    /// Keyring-backed store with the file fallback.
    ///
    /// A keyring that cannot even be opened leaves the file tier in charge.
    pub fn new() -> Result<Self> {
        let fallback: Box<dyn SecretBackend> = Box::new(FileBackend::new()?);
        Ok(Self::with_backends(keyring_tier(KeyringBackend::new()), fallback))
    }

    #[must_use]
    pub fn with_backends(primary: Box<dyn SecretBackend>, fallback: Box<dyn SecretBackend>) -> Self {
        Self { primary, fallback }
    }

    /// Persists the token, overwriting any previous one.
    pub fn save(&self, token: &TokenSet) -> Result<()> {
        let json = serde_json::to_string(token)?;
        match self.primary.set(&json) {
            Ok(()) => {
                // A stale fallback copy must not outlive the new token.
                if let Err(err) = self.fallback.delete() {
                    debug!(error = %err, "Could not clear fallback token");
                }
                Ok(())
            },
            Err(err) => {
                warn!(
                    tier = self.primary.name(),
                    error = %err,
                    "Primary credential store failed; using fallback"
                );
                self.fallback.set(&json)
            },
        }
    }

    /// Loads the token; `None` if nothing is stored in either tier.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidCredentials`] if stored data cannot be parsed.
    pub fn get(&self) -> Result<Option<TokenSet>> {
        let secret = match self.primary.get() {
            Ok(Some(secret)) => Some(secret),
            Ok(None) => self.fallback.get()?,
            Err(err) => {
                warn!(
                    tier = self.primary.name(),
                    error = %err,
                    "Primary credential store failed; using fallback"
                );
                self.fallback.get()?
            },
        };
        secret
            .map(|json| serde_json::from_str(&json).map_err(|_| AppError::InvalidCredentials))
            .transpose()
    }

    /// Deletes the token from both tiers.
    pub fn delete(&self) -> Result<()> {
        let primary = self.primary.delete();
        let fallback = self.fallback.delete();
        if let Err(err) = &primary {
            warn!(tier = self.primary.name(), error = %err, "Could not delete stored token");
        }
        fallback?;
        match primary {
            Ok(()) => Ok(()),
            // Still signed out locally as long as nothing readable remains.
            Err(err) => match self.primary.get() {
                Ok(None) | Err(_) => Ok(()),
                Ok(Some(_)) => Err(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct MemoryBackend {
        secret: Mutex<Option<String>>,
    }

    impl SecretBackend for MemoryBackend {
        fn name(&self) -> &'static str {
            "memory"
        }

        fn get(&self) -> Result<Option<String>> {
            Ok(self.secret.lock().clone())
        }

        fn set(&self, secret: &str) -> Result<()> {
            *self.secret.lock() = Some(secret.to_string());
            Ok(())
        }

        fn delete(&self) -> Result<()> {
            *self.secret.lock() = None;
            Ok(())
        }
    }

    struct BrokenBackend;

    impl SecretBackend for BrokenBackend {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn get(&self) -> Result<Option<String>> {
            Err(AppError::CredentialStorage("no secret service".to_string()))
        }

        fn set(&self, _secret: &str) -> Result<()> {
            Err(AppError::CredentialStorage("no secret service".to_string()))
        }

        fn delete(&self) -> Result<()> {
            Err(AppError::CredentialStorage("no secret service".to_string()))
        }
    }

    #[test]
    fn saves_and_loads_through_primary() {
        let store = CredentialStore::with_backends(
            Box::new(MemoryBackend::default()),
            Box::new(MemoryBackend::default()),
        );
        assert!(store.get().unwrap().is_none());

        store.save(&TokenSet::new("abc")).unwrap();
        assert_eq!(store.get().unwrap().unwrap().access_token, "abc");

        store.delete().unwrap();
        assert!(store.get().unwrap().is_none());
    }

    #[test]
    fn broken_primary_falls_back_transparently() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session-token.json");
        let store = CredentialStore::with_backends(
            Box::new(BrokenBackend),
            Box::new(FileBackend::with_path(path.clone())),
        );

        store.save(&TokenSet::new("abc")).unwrap();
        assert!(path.exists());
        assert_eq!(store.get().unwrap().unwrap().access_token, "abc");

        store.delete().unwrap();
        assert!(!path.exists());
        assert!(store.get().unwrap().is_none());
    }

    #[test]
    fn keyring_less_store_keeps_saved_token() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session-token.json");
        let keyring = Err(AppError::CredentialStorage("no secret service".to_string()));
        let store = CredentialStore::with_backends(
            keyring_tier(keyring),
            Box::new(FileBackend::with_path(path.clone())),
        );

        store.save(&TokenSet::new("abc")).unwrap();
        assert!(path.exists());
        assert_eq!(store.get().unwrap().unwrap().access_token, "abc");

        // A second save replaces the token rather than clearing it.
        store.save(&TokenSet::new("def")).unwrap();
        assert_eq!(store.get().unwrap().unwrap().access_token, "def");

        store.delete().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn primary_save_clears_stale_fallback() {
        let fallback = MemoryBackend::default();
        fallback.set("{\"stale\":true}").unwrap();
        let store =
            CredentialStore::with_backends(Box::new(MemoryBackend::default()), Box::new(fallback));

        store.save(&TokenSet::new("fresh")).unwrap();
        store.delete().unwrap();
        assert!(store.get().unwrap().is_none());
    }

    #[test]
    fn corrupted_secret_is_invalid_credentials() {
        let primary = MemoryBackend::default();
        primary.set("not json").unwrap();
        let store =
            CredentialStore::with_backends(Box::new(primary), Box::new(MemoryBackend::default()));

        assert!(matches!(store.get(), Err(AppError::InvalidCredentials)));
    }

    #[test]
    fn file_backend_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::with_path(dir.path().join("nested").join("token.json"));
        assert!(backend.get().unwrap().is_none());
        backend.delete().unwrap();

        backend.set("secret").unwrap();
        assert_eq!(backend.get().unwrap().as_deref(), Some("secret"));
    }

    #[cfg(unix)]
    #[test]
    fn file_backend_is_user_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        FileBackend::with_path(path.clone()).set("secret").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
