//! HTTP client with rate limiting for the intermediary and provider APIs.
//!
//! One client is shared by every caller so that all requests count against
//! the same limit. It wraps `reqwest::Client` and adds:
//! * Request rate limiting to stay well within the provider's quotas
//! * Bearer authentication and JSON bodies
//! * Consistent timeouts and `User-Agent`
//!
//! # Example
//!
//! ```rust
//! use playdeck::http::Client;
//!
//! let client = Client::new(&config)?;
//! let request = client.request(Method::GET, url).bearer(&token)?;
//! let response = client.execute(request).await?;
//! ```

use std::{future::Future, num::NonZeroU32, time::Duration};

use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{
    header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Method, Url,
};
use serde::Serialize;

use crate::{config::Config, error::Result};

/// HTTP client with built-in rate limiting.
pub struct Client {
    /// Unlimited request client for special cases.
    pub unlimited: reqwest::Client,

    rate_limiter: DefaultDirectRateLimiter,
}

/// A request under construction.
pub struct Request(reqwest::Request);

impl Client {
    /// Rolling window over which calls are counted.
    const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(5);

    /// Maximum calls per interval. Requests beyond this are delayed.
    const RATE_LIMIT_CALLS_PER_INTERVAL: u8 = 50;

    /// Duration to keep idle connections alive.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Duration to wait for individual network reads.
    const READ_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built, for instance when the
    /// `User-Agent` is invalid.
    ///
    /// # Panics
    ///
    /// Panics if rate limit parameters are zero.
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .read_timeout(Self::READ_TIMEOUT)
            .user_agent(&config.user_agent)
            .build()?;

        // Rate limit own requests as to not hammer the provider.
        let replenish_interval =
            Self::RATE_LIMIT_INTERVAL / u32::from(Self::RATE_LIMIT_CALLS_PER_INTERVAL);
        let quota = Quota::with_period(replenish_interval)
            .expect("quota time interval is zero")
            .allow_burst(
                NonZeroU32::new(Self::RATE_LIMIT_CALLS_PER_INTERVAL.into())
                    .expect("calls per interval is zero"),
            );

        Ok(Self {
            unlimited: http_client,
            rate_limiter: governor::RateLimiter::direct(quota),
        })
    }

    /// Builds a request with specified method and URL.
    #[must_use]
    pub fn request(&self, method: Method, url: Url) -> Request {
        Request(reqwest::Request::new(method, url))
    }

    #[must_use]
    pub fn post(&self, url: Url) -> Request {
        self.request(Method::POST, url)
    }

    /// Executes a request with rate limiting.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be sent or no response arrives.
    /// Non-success statuses are not errors at this level.
    pub fn execute(
        &self,
        request: Request,
    ) -> impl Future<Output = Result<reqwest::Response>> + '_ {
        // No need to await with jitter because the level of concurrency is low.
        let throttle = self.rate_limiter.until_ready();
        throttle.then(move |()| self.unlimited.execute(request.0).map_err(Into::into))
    }
}

impl Request {
    /// Adds a bearer `Authorization` header.
    pub fn bearer(mut self, token: &str) -> Result<Self> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
        value.set_sensitive(true);
        self.0.headers_mut().insert(AUTHORIZATION, value);
        Ok(self)
    }

    /// Sets a JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let body = serde_json::to_vec(body)?;
        self.0
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        *self.0.body_mut() = Some(body.into());
        Ok(self)
    }

    /// Sets an empty body. Some providers insist on `Content-Length` for
    /// bodiless `PUT` and `POST` requests.
    #[must_use]
    pub fn empty(mut self) -> Self {
        *self.0.body_mut() = Some(Vec::new().into());
        self
    }
}
