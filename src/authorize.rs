//! Authorization code flow, first leg.
//!
//! The user opens [`Authorization::url`] in a browser, consents, and is sent
//! back to the redirect URI with a `code` and the `state` generated here.
//! The state is saved in between and checked once on return. The code is
//! then handed to
//! [`TokenManager::begin_session`](crate::tokens::TokenManager::begin_session).

use std::{fs, io, path::Path};

use url::Url;

use crate::{
    config::Config,
    error::{Error, Result},
};

/// Characters used for the `state` parameter.
const STATE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const STATE_LENGTH: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Authorization {
    pub url: Url,

    /// Must match the `state` returned on the redirect.
    pub state: String,
}

impl Authorization {
    pub fn new(config: &Config) -> Result<Self> {
        if config.client_id.is_empty() {
            return Err(Error::invalid_argument("client_id is not configured"));
        }

        let state = random_state();
        let mut url = config.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &config.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", config.redirect_uri.as_str())
            .append_pair("scope", &config.scopes.join(" "))
            .append_pair("state", &state)
            .append_pair("show_dialog", "true");

        Ok(Self { url, state })
    }

    /// Remembers the state until the redirect comes back.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, &self.state)?;
        trace!("authorization state saved to {}", path.display());
        Ok(())
    }

    /// Checks the `state` returned on the redirect against the one saved by
    /// [`save`](Self::save). A saved state is accepted once.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when no authorization is pending or the state does
    /// not match.
    pub fn verify_saved(path: &Path, state: &str) -> Result<()> {
        let saved = match fs::read_to_string(path) {
            Ok(saved) => saved,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::invalid_argument("no authorization pending"));
            }
            Err(e) => return Err(e.into()),
        };

        if saved.len() != STATE_LENGTH || saved != state {
            return Err(Error::invalid_argument("authorization state mismatch"));
        }

        fs::remove_file(path)?;
        Ok(())
    }
}

fn random_state() -> String {
    (0..STATE_LENGTH)
        .map(|_| char::from(STATE_ALPHABET[fastrand::usize(..STATE_ALPHABET.len())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_carries_the_whole_request() {
        let config = Config {
            client_id: "abc123".to_owned(),
            ..Config::default()
        };

        let authorization = Authorization::new(&config).unwrap();
        let pairs: std::collections::HashMap<_, _> =
            authorization.url.query_pairs().into_owned().collect();

        assert_eq!(authorization.url.host_str(), Some("accounts.spotify.com"));
        assert_eq!(pairs["client_id"], "abc123");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["redirect_uri"], "http://127.0.0.1:3000/callback");
        assert_eq!(pairs["show_dialog"], "true");
        assert!(pairs["scope"].contains("streaming"));
        assert_eq!(pairs["state"], authorization.state);
        assert_eq!(authorization.state.len(), 16);
        assert!(authorization
            .state
            .chars()
            .all(|chr| chr.is_ascii_alphanumeric()));
    }

    #[test]
    fn client_id_is_required() {
        assert!(Authorization::new(&Config::default()).is_err());
    }

    #[test]
    fn saved_state_is_accepted_once() {
        let config = Config {
            client_id: "abc123".to_owned(),
            ..Config::default()
        };
        let path = std::env::temp_dir().join(format!(
            "playdeck-state-{}-{}",
            std::process::id(),
            fastrand::u64(..)
        ));

        let err = Authorization::verify_saved(&path, "anything").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidArgument);

        let authorization = Authorization::new(&config).unwrap();
        authorization.save(&path).unwrap();

        assert!(Authorization::verify_saved(&path, "forged").is_err());
        assert!(Authorization::verify_saved(&path, &authorization.state).is_ok());
        assert!(Authorization::verify_saved(&path, &authorization.state).is_err());
        assert!(!path.exists());
    }
}
