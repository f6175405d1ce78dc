//! Token lifecycle and playback device reconciliation for a streaming web
//! player.
//!
//! The crate keeps a delegated OAuth credential valid for its whole life and
//! keeps a local playback device in step with the provider's notion of the
//! active output:
//!
//! * [`tokens`] refreshes and exchanges credentials through a trusted
//!   [`intermediary`], persisting them in a [`credential`] store.
//! * [`gate`] wraps every provider call with a single refresh-and-retry.
//! * [`remote`] drives the local playback [`engine`] through its lifecycle and
//!   reconciles the active device; [`transport`] issues playback commands.
//! * [`library`] reads the user's catalogue through the same gate.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod authorize;
pub mod config;
pub mod credential;
pub mod engine;
pub mod error;
pub mod events;
pub mod gate;
pub mod http;
pub mod intermediary;
pub mod library;
pub mod player;
pub mod protocol;
pub mod remote;
pub mod retry;
pub mod session;
pub mod tokens;
pub mod transport;
pub mod webapi;

#[cfg(test)]
mod testing;
