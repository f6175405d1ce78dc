//! Authenticated access to the provider.
//!
//! Every provider call goes through [`Gate::call`], which supplies a valid
//! access token and recovers from one expired-token rejection by refreshing
//! and retrying exactly once. The outcome of each call drives the session's
//! connection status.
//!
//! A refresh failure ends the session: the stored credential is cleared and
//! the caller receives `Unauthenticated`. Only the credential the refresh
//! started from is cleared; one stored by a login in the meantime is kept.
//! The token manager itself never clears the store on failure, so this is
//! the one place that policy lives.
//!
//! # Example
//!
//! ```rust
//! let devices = gate
//!     .call(|api, token| async move { api.devices(&token).await })
//!     .await?;
//! ```

use std::{future::Future, sync::Arc};

use crate::{
    credential::Credential,
    error::{Error, ErrorKind, Result},
    session::Session,
    tokens::TokenManager,
    webapi::WebApi,
};

const UNAUTHORIZED: u16 = 401;
const FORBIDDEN: u16 = 403;

pub struct Gate {
    tokens: Arc<TokenManager>,
    api: Arc<dyn WebApi>,
    session: Arc<Session>,
}

impl Gate {
    #[must_use]
    pub fn new(tokens: Arc<TokenManager>, api: Arc<dyn WebApi>, session: Arc<Session>) -> Self {
        Self {
            tokens,
            api,
            session,
        }
    }

    /// Runs `op` with a valid access token.
    ///
    /// # Errors
    ///
    /// * `Unauthenticated` when logged out, when the token cannot be renewed,
    ///   or when the provider rejects the renewed token as well
    /// * `Upstream` for any other provider failure, without retry
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn(Arc<dyn WebApi>, String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let credential = self.credential().await?;

        match op(Arc::clone(&self.api), credential.access_token().to_owned()).await {
            Ok(value) => {
                self.session.set_connected(true);
                Ok(value)
            }
            Err(e) if e.status() == Some(UNAUTHORIZED) => {
                self.session.set_connected(false);
                debug!("access token rejected, refreshing once");

                let renewed = match self.tokens.refresh().await {
                    Ok(renewed) => renewed,
                    Err(e) => return Err(self.end_session(&credential, &e)),
                };

                match op(Arc::clone(&self.api), renewed.access_token().to_owned()).await {
                    Ok(value) => {
                        self.session.set_connected(true);
                        Ok(value)
                    }
                    Err(e) if e.status() == Some(UNAUTHORIZED) => Err(Error::unauthenticated(
                        format!("renewed access token rejected: {e}"),
                    )),
                    Err(e) => Err(self.surface(e)),
                }
            }
            Err(e) => Err(self.surface(e)),
        }
    }

    /// A valid credential, ending the session when it cannot be renewed.
    async fn credential(&self) -> Result<Credential> {
        let Some(stored) = self.tokens.credential()? else {
            self.session.set_connected(false);
            return Err(Error::unauthenticated("not logged in"));
        };

        match self.tokens.ensure_valid_token().await {
            Ok(credential) => Ok(credential),
            Err(e) if e.kind == ErrorKind::NoCredential => {
                self.session.set_connected(false);
                Err(Error::unauthenticated(e.to_string()))
            }
            Err(e) if e.kind == ErrorKind::RefreshFailed => Err(self.end_session(&stored, &e)),
            Err(e) => Err(e),
        }
    }

    /// Ends the session that `previous` belonged to. A credential stored by
    /// a login since then survives.
    fn end_session(&self, previous: &Credential, cause: &Error) -> Error {
        self.session.set_connected(false);
        match self.tokens.end_session_if_current(previous) {
            Ok(true) => {
                error!("{cause}; logging out");
                Error::unauthenticated(format!("session ended: {cause}"))
            }
            Ok(false) => {
                warn!("{cause}; a newer login is kept");
                Error::unauthenticated(cause.to_string())
            }
            Err(e) => {
                error!("could not clear credential: {e}");
                Error::unauthenticated(format!("session ended: {cause}"))
            }
        }
    }

    /// Passes a failure through, noting authorization failures.
    fn surface(&self, e: Error) -> Error {
        if matches!(e.status(), Some(UNAUTHORIZED | FORBIDDEN)) {
            self.session.set_connected(false);
        }
        e
    }

    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    #[must_use]
    pub fn api(&self) -> &Arc<dyn WebApi> {
        &self.api
    }
}
