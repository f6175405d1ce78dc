//! Wire types for the intermediary and the provider's Web API.
//!
//! # Submodules
//!
//! * [`auth`] - token exchange and refresh responses from the intermediary
//! * [`web`] - provider Web API resources: devices, playback, catalogue
//!
//! Responses are parsed through [`json`], which logs the parsed structure at
//! TRACE level and the raw body when parsing fails.

pub mod auth;
pub mod web;

use std::fmt::Debug;

use serde::Deserialize;

use crate::error::Result;

/// Parses and logs a JSON response body.
///
/// `origin` names the endpoint in log output.
///
/// # Errors
///
/// Returns error if the body is not valid JSON or does not match `T`.
pub fn json<T>(body: &str, origin: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    match serde_json::from_str(body) {
        Ok(result) => {
            trace!("{origin}: {result:#?}");
            Ok(result)
        }
        Err(e) => {
            if serde_json::from_str::<serde_json::Value>(body).is_ok() {
                debug!("{origin}: unexpected response structure ({e})");
            } else {
                error!("{origin}: failed parsing response ({e:?})");
            }
            trace!("{body}");
            Err(e.into())
        }
    }
}
