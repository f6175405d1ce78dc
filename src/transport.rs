//! Playback commands on the local device.
//!
//! Every command first reconciles the local device, so that nothing is sent
//! while it is not confirmed as the active output. A command that cannot get
//! its device activated fails with `DeviceNotActive` and leaves the player
//! state as it was.
//!
//! Skips are checked against the transitions the provider has disallowed
//! before anything is sent. After a skip the playback state is read back
//! once, because the engine's own notification may take arbitrarily long.
//!
//! Failures are recorded as the controller's last error for display; they
//! never change the controller's state.

use std::{future::Future, sync::Arc, time::Duration};

use crate::{
    error::{Error, Result},
    player::{PlayerState, Transition},
    protocol::web::PlayRequest,
    remote::Controller,
    webapi::WebApi,
};

impl Controller {
    /// Resumes playback.
    pub async fn play(&self) -> Result<()> {
        self.command(|api, token, device_id| async move {
            api.play(&token, &device_id, &PlayRequest::resume()).await
        })
        .await
    }

    pub async fn pause(&self) -> Result<()> {
        self.command(|api, token, device_id| async move { api.pause(&token, &device_id).await })
            .await
    }

    /// Pauses when playing, resumes otherwise.
    pub async fn toggle_play(&self) -> Result<()> {
        if self.player_state().is_playing {
            self.pause().await
        } else {
            self.play().await
        }
    }

    pub async fn seek(&self, position: Duration) -> Result<()> {
        self.command(|api, token, device_id| async move {
            api.seek(&token, &device_id, position).await
        })
        .await
    }

    pub async fn skip_next(&self) -> Result<()> {
        self.skip(Transition::SkippingNext).await
    }

    pub async fn skip_previous(&self) -> Result<()> {
        self.skip(Transition::SkippingPrev).await
    }

    /// Sets the volume in percent.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for values above 100.
    pub async fn set_volume(&self, percent: u8) -> Result<()> {
        if percent > 100 {
            return Err(Error::invalid_argument(format!(
                "volume must be between 0 and 100, not {percent}"
            )));
        }

        self.command(|api, token, device_id| async move {
            api.set_volume(&token, &device_id, percent).await
        })
        .await
    }

    /// Plays a track, album, playlist or artist by URI.
    pub async fn play_context(&self, uri: &str) -> Result<()> {
        if uri.is_empty() {
            return Err(Error::invalid_argument("URI is empty"));
        }

        let request = PlayRequest::for_uri(uri);
        self.command(|api, token, device_id| {
            let request = request.clone();
            async move { api.play(&token, &device_id, &request).await }
        })
        .await
    }

    async fn skip(&self, transition: Transition) -> Result<()> {
        let epoch = self.epoch();

        if !self.player_state().allows(transition) {
            let e = Error::transition_disallowed(format!("{transition} is not allowed now"));
            warn!("{e}");
            self.record_error(epoch, &e);
            return Err(e);
        }

        self.command(|api, token, device_id| async move {
            match transition {
                Transition::SkippingPrev => api.previous(&token, &device_id).await,
                _ => api.next(&token, &device_id).await,
            }
        })
        .await?;

        // The skip went through; a failed re-read only leaves the player
        // state stale until the next notification.
        tokio::time::sleep(self.timings().skip_recheck).await;
        match self
            .gate()
            .call(|api, token| async move { api.playback_state(&token).await })
            .await
        {
            Ok(state) => {
                let player = state.map(PlayerState::from).unwrap_or_default();
                if let Some(track) = &player.current_track {
                    debug!("now playing: {track}");
                }
                self.replace_player(epoch, player);
            }
            Err(e) => warn!("could not re-read playback state: {e}"),
        }

        Ok(())
    }

    /// Activates the local device and runs `op` against it.
    async fn command<F, Fut>(&self, op: F) -> Result<()>
    where
        F: Fn(Arc<dyn WebApi>, String, String) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let epoch = self.epoch();

        let device_id = match self.reconcile_device().await {
            Ok(device_id) => device_id,
            Err(e) => {
                let e = Error::device_not_active(e.to_string());
                warn!("{e}");
                self.record_error(epoch, &e);
                return Err(e);
            }
        };

        let result = self
            .gate()
            .call(|api, token| op(api, token, device_id.clone()))
            .await;
        if let Err(e) = &result {
            warn!("{e}");
            self.record_error(epoch, e);
        }

        result
    }
}
