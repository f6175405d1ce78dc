//! Credential lifecycle.
//!
//! [`TokenManager`] is the only writer of the [`CredentialStore`]. It hands
//! out a valid credential, renewing it through the [`TokenExchange`] once the
//! access token has expired, and performs the initial authorization code
//! exchange.
//!
//! # Concurrency
//!
//! At most one refresh runs at a time. The first caller that needs one starts
//! it and publishes a shared handle; everyone arriving while it is pending
//! awaits that same handle and observes the same credential or the same
//! failure. Duplicate refreshes would otherwise race to rotate the refresh
//! token and invalidate each other.
//!
//! # Example
//!
//! ```rust
//! let tokens = TokenManager::new(store, intermediary);
//! let credential = tokens.ensure_valid_token().await?;
//! println!("expires at {:?}", credential.expires_at());
//! ```

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::SystemTime,
};

use futures_util::{
    future::{BoxFuture, Shared},
    FutureExt,
};

use crate::{
    credential::{Credential, CredentialStore},
    error::{Error, ErrorKind, Result},
    intermediary::TokenExchange,
    protocol::auth::TokenResponse,
};

/// Pending refresh shared between callers. Errors are reference counted so
/// that every caller can receive the outcome.
type Refresh = Shared<BoxFuture<'static, std::result::Result<Credential, Arc<Error>>>>;

pub struct TokenManager {
    store: Arc<dyn CredentialStore>,
    exchange: Arc<dyn TokenExchange>,
    in_flight: Mutex<Option<Refresh>>,
}

impl TokenManager {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, exchange: Arc<dyn TokenExchange>) -> Self {
        Self {
            store,
            exchange,
            in_flight: Mutex::new(None),
        }
    }

    /// Returns a credential whose access token has not expired.
    ///
    /// # Errors
    ///
    /// * `NoCredential` when logged out
    /// * `RefreshFailed` when the expired token could not be renewed
    pub async fn ensure_valid_token(&self) -> Result<Credential> {
        self.ensure_valid_token_at(SystemTime::now()).await
    }

    pub(crate) async fn ensure_valid_token_at(&self, now: SystemTime) -> Result<Credential> {
        let Some(credential) = self.store.load()? else {
            return Err(Error::no_credential("not logged in"));
        };

        if credential.is_expired_at(now) {
            debug!("access token expired, refreshing");
            return self.refresh().await;
        }

        Ok(credential)
    }

    /// Renews the access token, joining a refresh that is already pending.
    ///
    /// The store is left untouched on failure. Callers should treat failure
    /// as the end of the session rather than retrying.
    pub async fn refresh(&self) -> Result<Credential> {
        let refresh = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(refresh) = in_flight.as_ref() {
                trace!("joining pending refresh");
                refresh.clone()
            } else {
                let refresh =
                    Self::renew(Arc::clone(&self.store), Arc::clone(&self.exchange))
                        .boxed()
                        .shared();
                *in_flight = Some(refresh.clone());
                refresh
            }
        };

        let result = refresh.clone().await;

        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if in_flight
                .as_ref()
                .is_some_and(|pending| Shared::ptr_eq(pending, &refresh))
            {
                *in_flight = None;
            }
        }

        result.map_err(|e| Error::new(e.kind, e.error.to_string()))
    }

    async fn renew(
        store: Arc<dyn CredentialStore>,
        exchange: Arc<dyn TokenExchange>,
    ) -> std::result::Result<Credential, Arc<Error>> {
        let renewal = async {
            let current = store
                .load()
                .map_err(|e| Error::refresh_failed(e.to_string()))?
                .ok_or_else(|| Error::refresh_failed("no refresh token stored"))?;

            let response = exchange
                .refresh(current.refresh_token())
                .await
                .map_err(|e| match e.kind {
                    ErrorKind::RefreshFailed => e,
                    _ => Error::refresh_failed(e.to_string()),
                })?;

            let credential =
                credential_from(response, Some(current.refresh_token()), SystemTime::now())
                    .map_err(|e| Error::refresh_failed(e.to_string()))?;

            // The session may have ended or been replaced by a new login
            // while the request was pending. A new login wins.
            match store
                .load()
                .map_err(|e| Error::refresh_failed(e.to_string()))?
            {
                None => return Err(Error::refresh_failed("session ended during refresh")),
                Some(stored) if stored != current => {
                    info!("credential replaced during refresh, using the new one");
                    return Ok(stored);
                }
                Some(_) => {}
            }

            store
                .save(&credential)
                .map_err(|e| Error::refresh_failed(e.to_string()))?;

            info!("access token refreshed");
            Ok::<_, Error>(credential)
        };

        renewal.await.map_err(|e| {
            warn!("{e}");
            Arc::new(e)
        })
    }

    /// Exchanges an authorization code for the first credential of a session
    /// and stores it.
    ///
    /// # Errors
    ///
    /// `ExchangeFailed` when the intermediary rejects the code or its response
    /// lacks either token.
    pub async fn begin_session(&self, code: &str) -> Result<Credential> {
        if code.is_empty() {
            return Err(Error::exchange_failed("authorization code is empty"));
        }

        let response = self.exchange.exchange(code).await.map_err(|e| match e.kind {
            ErrorKind::ExchangeFailed => e,
            _ => Error::exchange_failed(e.to_string()),
        })?;

        let credential = credential_from(response, None, SystemTime::now())
            .map_err(|e| Error::exchange_failed(e.to_string()))?;
        self.store.save(&credential)?;

        info!("session started");
        Ok(credential)
    }

    /// Forgets the stored credential. Ending a session that has already ended
    /// succeeds.
    pub fn end_session(&self) -> Result<()> {
        self.store.clear()?;
        info!("session ended");
        Ok(())
    }

    /// Forgets the stored credential if it is still `previous`. Returns
    /// whether the session ended; a credential stored by a later login is
    /// kept.
    pub fn end_session_if_current(&self, previous: &Credential) -> Result<bool> {
        match self.store.load()? {
            Some(stored) if stored != *previous => {
                debug!("keeping credential stored since the failure");
                Ok(false)
            }
            _ => {
                self.end_session()?;
                Ok(true)
            }
        }
    }

    /// Whether a credential is stored, expired or not.
    #[must_use]
    pub fn has_token(&self) -> bool {
        match self.store.load() {
            Ok(credential) => credential.is_some(),
            Err(e) => {
                error!("could not read credential: {e}");
                false
            }
        }
    }

    pub fn credential(&self) -> Result<Option<Credential>> {
        self.store.load()
    }
}

/// Builds a credential from a token response. Without a rotated refresh
/// token in the response, `previous` is kept.
fn credential_from(
    response: TokenResponse,
    previous: Option<&str>,
    now: SystemTime,
) -> Result<Credential> {
    if response.access_token.is_empty() {
        return Err(Error::invalid_argument("response has no access token"));
    }

    let refresh_token = match (response.refresh_token, previous) {
        (Some(rotated), _) if !rotated.is_empty() => rotated,
        (_, Some(previous)) => previous.to_owned(),
        (_, None) => return Err(Error::invalid_argument("response has no refresh token")),
    };

    let expires_at = now
        .checked_add(response.expires_in)
        .ok_or_else(|| Error::invalid_argument("token lifetime out of range"))?;

    Ok(Credential::new(
        response.access_token,
        refresh_token,
        expires_at,
    ))
}
