//! Token exchange through the trusted intermediary.
//!
//! The client secret never leaves the intermediary: playdeck posts the
//! authorization code or refresh token to it and receives fresh tokens back.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

use crate::{
    config::Config,
    error::{Error, ErrorKind, Result},
    http,
    protocol::auth::{ErrorBody, ExchangeRequest, RefreshRequest, TokenResponse},
};

/// Source of provider tokens.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Exchanges a one-time authorization code for tokens.
    async fn exchange(&self, code: &str) -> Result<TokenResponse>;

    /// Renews the access token with a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse>;
}

/// [`TokenExchange`] over HTTP.
pub struct HttpIntermediary {
    client: Arc<http::Client>,
    exchange_url: Url,
    refresh_url: Url,
}

impl HttpIntermediary {
    const EXCHANGE_PATH: &'static str = "auth/token/exchange";
    const REFRESH_PATH: &'static str = "auth/token/refresh";

    pub fn new(config: &Config, client: Arc<http::Client>) -> Result<Self> {
        Ok(Self {
            client,
            exchange_url: config.intermediary_endpoint(Self::EXCHANGE_PATH)?,
            refresh_url: config.intermediary_endpoint(Self::REFRESH_PATH)?,
        })
    }

    async fn post<T: serde::Serialize + Sync>(
        &self,
        url: &Url,
        body: &T,
        kind: ErrorKind,
    ) -> Result<TokenResponse> {
        let request = self.client.post(url.clone()).json(body)?;
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| Error::new(kind, e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::new(kind, e.to_string()))?;

        tokens_from(status, &body, kind, url.path())
    }
}

/// Reads tokens from an intermediary response. Any non-success status or a
/// body without tokens is a failure of `kind`.
fn tokens_from(
    status: StatusCode,
    body: &str,
    kind: ErrorKind,
    origin: &str,
) -> Result<TokenResponse> {
    if !status.is_success() {
        let details = serde_json::from_str::<ErrorBody>(body).unwrap_or_default();
        return Err(Error::new(kind, format!("{origin} returned {status}: {details}")));
    }

    // Not through `protocol::json`: the raw body holds tokens.
    serde_json::from_str(body)
        .map_err(|e| Error::new(kind, format!("{origin} returned malformed tokens: {e}")))
}

#[async_trait]
impl TokenExchange for HttpIntermediary {
    async fn exchange(&self, code: &str) -> Result<TokenResponse> {
        debug!("exchanging authorization code");
        self.post(
            &self.exchange_url,
            &ExchangeRequest { code },
            ErrorKind::ExchangeFailed,
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        debug!("refreshing access token");
        self.post(
            &self.refresh_url,
            &RefreshRequest { refresh_token },
            ErrorKind::RefreshFailed,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const ORIGIN: &str = "/auth/token/refresh";

    #[test]
    fn shares_the_rate_limited_client() {
        let config = Config::default();
        let client = Arc::new(http::Client::new(&config).unwrap());

        let intermediary = HttpIntermediary::new(&config, Arc::clone(&client)).unwrap();
        let api = crate::webapi::HttpWebApi::new(&config, Arc::clone(&client));

        assert_eq!(Arc::strong_count(&client), 3);
        assert!(Arc::ptr_eq(&intermediary.client, &client));
        assert_eq!(
            intermediary.refresh_url.as_str(),
            "http://127.0.0.1:3000/auth/token/refresh"
        );
        drop(api);
        assert_eq!(Arc::strong_count(&client), 2);
    }

    #[test]
    fn invalid_grant_fails_the_refresh() {
        let err = tokens_from(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Refresh token revoked"}"#,
            ErrorKind::RefreshFailed,
            ORIGIN,
        )
        .unwrap_err();

        assert_eq!(err.kind, ErrorKind::RefreshFailed);
        assert!(err
            .to_string()
            .ends_with("400 Bad Request: invalid_grant: Refresh token revoked"));
    }

    #[test]
    fn any_failure_status_is_a_failure() {
        let err = tokens_from(
            StatusCode::INTERNAL_SERVER_ERROR,
            "upstream timed out",
            ErrorKind::ExchangeFailed,
            "/auth/token/exchange",
        )
        .unwrap_err();

        assert_eq!(err.kind, ErrorKind::ExchangeFailed);
        assert!(err.to_string().ends_with("no details"));
    }

    #[test]
    fn malformed_body_is_a_failure() {
        for body in ["", "{}", r#"{"access_token":"a"}"#, "<html>"] {
            let err = tokens_from(StatusCode::OK, body, ErrorKind::RefreshFailed, ORIGIN)
                .unwrap_err();
            assert_eq!(err.kind, ErrorKind::RefreshFailed, "{body}");
        }
    }

    #[test]
    fn tokens_are_read_from_success() {
        let response = tokens_from(
            StatusCode::OK,
            r#"{"access_token":"new","refresh_token":"rotated","expires_in":3600}"#,
            ErrorKind::RefreshFailed,
            ORIGIN,
        )
        .unwrap();

        assert_eq!(response.access_token, "new");
        assert_eq!(response.refresh_token.as_deref(), Some("rotated"));
        assert_eq!(response.expires_in, Duration::from_secs(3600));
    }
}
