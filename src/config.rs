//! Configuration for playdeck.
//!
//! Configuration is read from a TOML file in which every key is optional:
//!
//! ```toml
//! intermediary_url = "http://127.0.0.1:3000/"
//! client_id = "0123456789abcdef0123456789abcdef"
//! credentials_file = "credentials.toml"
//! connect_interval_ms = 1000
//! connect_attempts = 10
//! settle_delay_ms = 1000
//! ```
//!
//! Missing keys fall back to the values of [`Config::default`].

use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds};
use url::Url;

use crate::error::{Error, Result};

/// Scopes requested during authorization.
pub const DEFAULT_SCOPES: [&str; 15] = [
    "user-read-private",
    "user-read-email",
    "user-read-playback-state",
    "user-modify-playback-state",
    "user-read-currently-playing",
    "user-read-recently-played",
    "user-top-read",
    "playlist-read-private",
    "playlist-read-collaborative",
    "playlist-modify-public",
    "playlist-modify-private",
    "playlist-modify",
    "streaming",
    "user-library-read",
    "user-library-modify",
];

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Base URL of the trusted intermediary that holds the client secret.
    pub intermediary_url: Url,

    /// Base URL of the provider's Web API.
    pub api_url: Url,

    /// The provider's authorization endpoint.
    pub authorize_url: Url,

    pub client_id: String,
    pub redirect_uri: Url,
    pub scopes: Vec<String>,

    /// Where the credential is persisted between runs.
    pub credentials_file: PathBuf,

    /// Provider device to attach to when no local engine is available.
    pub device_id: Option<String>,

    /// Interval between checks while waiting for the session to connect.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "connect_interval_ms")]
    pub connect_interval: Duration,

    /// Number of checks before giving up on the session.
    pub connect_attempts: u32,

    /// Time given to the provider to propagate a playback transfer.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "settle_delay_ms")]
    pub settle_delay: Duration,

    /// Wait before re-reading playback state after a skip.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "skip_recheck_delay_ms")]
    pub skip_recheck_delay: Duration,

    #[serde(skip)]
    pub app_name: String,
    #[serde(skip)]
    pub app_version: String,
    #[serde(skip)]
    pub user_agent: String,
}

impl Config {
    /// Configuration files should be small.
    const MAX_FILE_SIZE: u64 = 64 * 1024;

    /// Reads the configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Will return `Err` if:
    /// - the file cannot be read or is too large
    /// - the file is not valid TOML or contains unknown keys
    /// - the resulting `User-Agent` would be invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Prevent out-of-memory condition on a misplaced file.
        let file_size = fs::metadata(path)?.len();
        if file_size > Self::MAX_FILE_SIZE {
            return Err(Error::invalid_argument(format!(
                "{} is too large ({file_size} bytes)",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;
        trace!("configuration loaded from {}", path.display());

        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.connect_attempts == 0 {
            return Err(Error::invalid_argument(
                "connect_attempts must be at least 1",
            ));
        }

        Ok(())
    }

    /// Where a pending authorization keeps its state, next to the
    /// credentials file.
    #[must_use]
    pub fn authorization_state_file(&self) -> PathBuf {
        self.credentials_file.with_extension("state")
    }

    /// The intermediary endpoint for `path`, relative to its base URL.
    pub fn intermediary_endpoint(&self, path: &str) -> Result<Url> {
        with_trailing_slash(&self.intermediary_url)
            .join(path)
            .map_err(Into::into)
    }
}

impl Default for Config {
    fn default() -> Self {
        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let user_agent = format!("{app_name}/{app_version} (Rust; {os_name})");

        Self {
            intermediary_url: Url::parse("http://127.0.0.1:3000/")
                .expect("invalid intermediary url"),
            api_url: Url::parse("https://api.spotify.com/v1/").expect("invalid api url"),
            authorize_url: Url::parse("https://accounts.spotify.com/authorize")
                .expect("invalid authorize url"),
            client_id: String::new(),
            redirect_uri: Url::parse("http://127.0.0.1:3000/callback")
                .expect("invalid redirect uri"),
            scopes: DEFAULT_SCOPES.iter().map(ToString::to_string).collect(),
            credentials_file: PathBuf::from("credentials.toml"),
            device_id: None,
            connect_interval: Duration::from_secs(1),
            connect_attempts: 10,
            settle_delay: Duration::from_secs(1),
            skip_recheck_delay: Duration::from_millis(500),
            app_name,
            app_version,
            user_agent,
        }
    }
}

/// `Url::join` replaces the last path segment unless the base ends in `/`.
pub(crate) fn with_trailing_slash(url: &Url) -> Url {
    let mut url = url.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
