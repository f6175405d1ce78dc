//! Credential storage.
//!
//! A [`Credential`] is the access and refresh token pair handed out by the
//! provider, plus the moment the access token stops being valid. Stores only
//! persist it: deciding when a credential is replaced is up to
//! [`TokenManager`](crate::tokens::TokenManager).
//!
//! Two stores are provided:
//! * [`MemoryStore`] keeps the credential for the life of the process
//! * [`FileStore`] persists it across runs in a small TOML file
//!
//! The file store uses fixed keys:
//!
//! ```toml
//! spotify_access_token = "BQD..."
//! spotify_refresh_token = "AQC..."
//! spotify_token_expires = 1735689600000
//! ```
//!
//! Expiry is in milliseconds since the Unix epoch. A file holding only some
//! of the keys is treated as logged out.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
    time::SystemTime,
};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampMilliSeconds};
use veil::Redact;

use crate::error::{Error, Result};

/// Delegated access to the provider.
#[derive(Clone, PartialEq, Eq, Redact)]
pub struct Credential {
    #[redact]
    access_token: String,
    #[redact]
    refresh_token: String,
    expires_at: SystemTime,
}

impl Credential {
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: SystemTime,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    #[must_use]
    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    #[must_use]
    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    /// Whether the access token is expired at `now`. A token that expires
    /// exactly at `now` is expired.
    #[must_use]
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }
}

/// Persistence for the single current credential.
///
/// `load` returning `Ok(None)` means the user is logged out.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<Credential>>;
    fn save(&self, credential: &Credential) -> Result<()>;

    /// Removes the credential. Clearing an empty store succeeds.
    fn clear(&self) -> Result<()>;
}

/// In-process credential store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    credential: Mutex<Option<Credential>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential: Mutex::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> Result<Option<Credential>> {
        Ok(self
            .credential
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        *self
            .credential
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.credential
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

#[serde_as]
#[derive(Default, Deserialize, Serialize)]
struct Persisted {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    spotify_access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    spotify_refresh_token: Option<String>,

    #[serde_as(as = "Option<TimestampMilliSeconds<i64>>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    spotify_token_expires: Option<SystemTime>,
}

/// Credential store backed by a TOML file.
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Credential files hold three short values.
    const MAX_FILE_SIZE: u64 = 16 * 1024;

    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temporary_path(&self) -> PathBuf {
        let mut path = self.path.clone().into_os_string();
        path.push(".tmp");
        path.into()
    }
}

impl CredentialStore for FileStore {
    fn load(&self) -> Result<Option<Credential>> {
        // Prevent out-of-memory condition: the file should be small.
        let file_size = match fs::metadata(&self.path) {
            Ok(attributes) => attributes.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if file_size > Self::MAX_FILE_SIZE {
            return Err(Error::invalid_argument(format!(
                "{} is too large ({file_size} bytes)",
                self.path.display()
            )));
        }

        let contents = fs::read_to_string(&self.path)?;
        let persisted: Persisted = toml::from_str(&contents)?;

        match persisted {
            Persisted {
                spotify_access_token: Some(access_token),
                spotify_refresh_token: Some(refresh_token),
                spotify_token_expires: Some(expires_at),
            } => Ok(Some(Credential::new(
                access_token,
                refresh_token,
                expires_at,
            ))),
            Persisted {
                spotify_access_token: None,
                spotify_refresh_token: None,
                spotify_token_expires: None,
            } => Ok(None),
            _ => {
                warn!(
                    "{} holds an incomplete credential; treating as logged out",
                    self.path.display()
                );
                Ok(None)
            }
        }
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        let persisted = Persisted {
            spotify_access_token: Some(credential.access_token.clone()),
            spotify_refresh_token: Some(credential.refresh_token.clone()),
            spotify_token_expires: Some(credential.expires_at),
        };
        let contents = toml::to_string(&persisted)?;

        // Replace the file in one step so that a reader never sees half of it.
        let temporary = self.temporary_path();
        fs::write(&temporary, contents)?;
        fs::rename(&temporary, &self.path)?;

        trace!("credential saved to {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("credential removed from {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "playdeck-{name}-{}-{}.toml",
            std::process::id(),
            fastrand::u64(..)
        ))
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let expires_at = UNIX_EPOCH + Duration::from_secs(1_000);
        let credential = Credential::new("access", "refresh", expires_at);

        assert!(!credential.is_expired_at(expires_at - Duration::from_millis(1)));
        assert!(credential.is_expired_at(expires_at));
        assert!(credential.is_expired_at(expires_at + Duration::from_millis(1)));
    }

    #[test]
    fn tokens_are_redacted() {
        let credential = Credential::new("secret-access", "secret-refresh", UNIX_EPOCH);
        let debug = format!("{credential:?}");
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
    }

    #[test]
    fn memory_store_clear_is_idempotent() {
        let store = MemoryStore::with_credential(Credential::new("a", "r", UNIX_EPOCH));
        assert!(store.load().unwrap().is_some());
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn file_store_persists_under_fixed_keys() {
        let path = scratch_path("persist");
        let store = FileStore::new(&path);
        assert!(store.load().unwrap().is_none());

        let credential = Credential::new(
            "access",
            "refresh",
            UNIX_EPOCH + Duration::from_millis(1_735_689_600_123),
        );
        store.save(&credential).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("spotify_access_token = \"access\""));
        assert!(contents.contains("spotify_refresh_token = \"refresh\""));
        assert!(contents.contains("spotify_token_expires = 1735689600123"));
        assert_eq!(store.load().unwrap(), Some(credential));

        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn partial_file_is_logged_out() {
        let path = scratch_path("partial");
        fs::write(&path, "spotify_access_token = \"access\"\n").unwrap();

        let store = FileStore::new(&path);
        assert!(store.load().unwrap().is_none());

        fs::remove_file(&path).unwrap();
    }
}
