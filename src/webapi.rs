//! Provider Web API calls.
//!
//! Every call takes the bearer token explicitly. Retrying with a renewed
//! token is the business of the [`Gate`](crate::gate::Gate), so nothing here
//! consults the credential store.
//!
//! Non-success responses become [`ErrorKind::Upstream`] errors carrying the
//! HTTP status and the provider's message. Failures that never produced a
//! response carry no status.
//!
//! [`ErrorKind::Upstream`]: crate::error::ErrorKind::Upstream

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use url::Url;

use crate::{
    config::{self, Config},
    error::{Error, ErrorKind, Result},
    http,
    protocol::{
        self,
        web::{Devices, ErrorResponse, PlayRequest, PlaybackState, TransferRequest},
    },
};

/// Provider operations used by the device controller and the library.
#[async_trait]
pub trait WebApi: Send + Sync {
    async fn devices(&self, token: &str) -> Result<Devices>;

    /// Transfers playback to `device_id`, starting playback when `play`.
    async fn transfer_playback(&self, token: &str, device_id: &str, play: bool) -> Result<()>;

    /// Current playback, or `None` when nothing is playing anywhere.
    async fn playback_state(&self, token: &str) -> Result<Option<PlaybackState>>;

    async fn play(&self, token: &str, device_id: &str, request: &PlayRequest) -> Result<()>;
    async fn pause(&self, token: &str, device_id: &str) -> Result<()>;
    async fn seek(&self, token: &str, device_id: &str, position: Duration) -> Result<()>;
    async fn next(&self, token: &str, device_id: &str) -> Result<()>;
    async fn previous(&self, token: &str, device_id: &str) -> Result<()>;
    async fn set_volume(&self, token: &str, device_id: &str, percent: u8) -> Result<()>;

    /// Reads any resource below the API base URL.
    async fn get(&self, token: &str, path: &str, query: &[(&str, String)]) -> Result<Value>;

    /// Creates or appends to a resource below the API base URL.
    async fn post(&self, token: &str, path: &str, body: &Value) -> Result<Value>;
}

/// [`WebApi`] over HTTP.
pub struct HttpWebApi {
    client: Arc<http::Client>,
    base_url: Url,
}

impl HttpWebApi {
    #[must_use]
    pub fn new(config: &Config, client: Arc<http::Client>) -> Self {
        Self {
            client,
            base_url: config::with_trailing_slash(&config.api_url),
        }
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url> {
        let mut url = self.base_url.join(path)?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(key, value)| (*key, value.as_str())));
        }
        Ok(url)
    }

    fn device_query(device_id: &str) -> [(&'static str, String); 1] {
        [("device_id", device_id.to_owned())]
    }

    /// Sends a request and returns the response body, `None` for an empty
    /// one.
    async fn send(
        &self,
        method: Method,
        url: Url,
        token: &str,
        body: Option<&Value>,
    ) -> Result<Option<String>> {
        let path = url.path().to_owned();
        let request = self.client.request(method.clone(), url).bearer(token)?;
        let request = match body {
            Some(body) => request.json(body)?,
            None if method == Method::GET => request,
            None => request.empty(),
        };

        let response = self.client.execute(request).await?;
        let status = response.status();
        let text = response.text().await?;

        let body = classify(status, text);
        match &body {
            Ok(_) => trace!("{method} {path}: {status}"),
            Err(e) => debug!("{method} {path}: {e}"),
        }
        body
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        token: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<()> {
        let url = self.url(path, query)?;
        self.send(method, url, token, body).await.map(|_| ())
    }
}

#[async_trait]
impl WebApi for HttpWebApi {
    async fn devices(&self, token: &str) -> Result<Devices> {
        let url = self.url("me/player/devices", &[])?;
        match self.send(Method::GET, url, token, None).await? {
            Some(body) => decode(&body, "devices"),
            None => Ok(Devices::default()),
        }
    }

    async fn transfer_playback(&self, token: &str, device_id: &str, play: bool) -> Result<()> {
        let body = serde_json::to_value(TransferRequest {
            device_ids: [device_id],
            play,
        })?;
        self.command(Method::PUT, "me/player", token, &[], Some(&body))
            .await
    }

    async fn playback_state(&self, token: &str) -> Result<Option<PlaybackState>> {
        let url = self.url("me/player", &[])?;
        match self.send(Method::GET, url, token, None).await? {
            Some(body) => decode(&body, "playback state").map(Some),
            None => Ok(None),
        }
    }

    async fn play(&self, token: &str, device_id: &str, request: &PlayRequest) -> Result<()> {
        let body = serde_json::to_value(request)?;
        self.command(
            Method::PUT,
            "me/player/play",
            token,
            &Self::device_query(device_id),
            Some(&body),
        )
        .await
    }

    async fn pause(&self, token: &str, device_id: &str) -> Result<()> {
        self.command(
            Method::PUT,
            "me/player/pause",
            token,
            &Self::device_query(device_id),
            None,
        )
        .await
    }

    async fn seek(&self, token: &str, device_id: &str, position: Duration) -> Result<()> {
        let position_ms = u64::try_from(position.as_millis())
            .map_err(|_| Error::invalid_argument("seek position out of range"))?;
        self.command(
            Method::PUT,
            "me/player/seek",
            token,
            &[
                ("position_ms", position_ms.to_string()),
                ("device_id", device_id.to_owned()),
            ],
            None,
        )
        .await
    }

    async fn next(&self, token: &str, device_id: &str) -> Result<()> {
        self.command(
            Method::POST,
            "me/player/next",
            token,
            &Self::device_query(device_id),
            None,
        )
        .await
    }

    async fn previous(&self, token: &str, device_id: &str) -> Result<()> {
        self.command(
            Method::POST,
            "me/player/previous",
            token,
            &Self::device_query(device_id),
            None,
        )
        .await
    }

    async fn set_volume(&self, token: &str, device_id: &str, percent: u8) -> Result<()> {
        self.command(
            Method::PUT,
            "me/player/volume",
            token,
            &[
                ("volume_percent", percent.to_string()),
                ("device_id", device_id.to_owned()),
            ],
            None,
        )
        .await
    }

    async fn get(&self, token: &str, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = self.url(path, query)?;
        match self.send(Method::GET, url, token, None).await? {
            Some(body) => decode(&body, path),
            None => Ok(Value::Null),
        }
    }

    async fn post(&self, token: &str, path: &str, body: &Value) -> Result<Value> {
        let url = self.url(path, &[])?;
        match self.send(Method::POST, url, token, Some(body)).await? {
            Some(body) => decode(&body, path),
            None => Ok(Value::Null),
        }
    }
}

/// Turns a response into its body: `None` for no content, an `Upstream`
/// error with the provider's message for any non-success status.
fn classify(status: StatusCode, body: String) -> Result<Option<String>> {
    if !status.is_success() {
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|response| response.error.message)
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or_default().to_owned());
        return Err(Error::upstream(status.as_u16(), message));
    }

    if status == StatusCode::NO_CONTENT || body.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(body))
}

/// Parses a provider resource. A body that does not match is the provider's
/// failure, not the caller's.
fn decode<T>(body: &str, origin: &str) -> Result<T>
where
    T: for<'de> serde::Deserialize<'de> + std::fmt::Debug,
{
    protocol::json(body, origin).map_err(|e| Error::new(ErrorKind::Upstream(None), e.error))
}
