//! Projection of the provider's playback state.
//!
//! [`PlayerState`] is never patched: every state change notification or
//! re-read replaces it as a whole.

use std::{collections::HashSet, fmt, str::FromStr, time::Duration};

use crate::{
    error::Error,
    protocol::web::{PlaybackState, Track},
};

/// Playback transitions the provider may disallow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Transition {
    InterruptingPlayback,
    Pausing,
    Resuming,
    Seeking,
    SkippingNext,
    SkippingPrev,
    TogglingRepeatContext,
    TogglingRepeatTrack,
    TogglingShuffle,
    TransferringPlayback,
}

impl Transition {
    const NAMES: [(Self, &'static str); 10] = [
        (Self::InterruptingPlayback, "interrupting_playback"),
        (Self::Pausing, "pausing"),
        (Self::Resuming, "resuming"),
        (Self::Seeking, "seeking"),
        (Self::SkippingNext, "skipping_next"),
        (Self::SkippingPrev, "skipping_prev"),
        (Self::TogglingRepeatContext, "toggling_repeat_context"),
        (Self::TogglingRepeatTrack, "toggling_repeat_track"),
        (Self::TogglingShuffle, "toggling_shuffle"),
        (Self::TransferringPlayback, "transferring_playback"),
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        Self::NAMES
            .iter()
            .find_map(|(transition, name)| (*transition == self).then_some(*name))
            .unwrap_or_default()
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Transition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::NAMES
            .iter()
            .find_map(|(transition, name)| (*name == s).then_some(*transition))
            .ok_or_else(|| Error::invalid_argument(format!("unknown transition: {s}")))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackInfo {
    pub id: Option<String>,
    pub uri: String,
    pub name: String,
    pub artists: String,
    pub album: Option<String>,
    pub image: Option<String>,
    pub duration: Duration,
}

impl From<&Track> for TrackInfo {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id.clone(),
            uri: track.uri.clone(),
            name: track.name.clone(),
            artists: track.artist_names(),
            album: track.album.as_ref().map(|album| album.name.clone()),
            image: track
                .album
                .as_ref()
                .and_then(|album| album.images.first())
                .map(|image| image.url.clone()),
            duration: Duration::from_millis(track.duration_ms),
        }
    }
}

impl fmt::Display for TrackInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.artists.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} - {}", self.artists, self.name)
        }
    }
}

/// What the provider reports about playback. The default is the stopped,
/// empty state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlayerState {
    pub is_playing: bool,
    pub current_track: Option<TrackInfo>,
    pub position: Duration,
    pub disallowed: HashSet<Transition>,
}

impl PlayerState {
    #[must_use]
    pub fn allows(&self, transition: Transition) -> bool {
        !self.disallowed.contains(&transition)
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.current_track
            .as_ref()
            .map_or(Duration::ZERO, |track| track.duration)
    }
}

impl From<PlaybackState> for PlayerState {
    fn from(state: PlaybackState) -> Self {
        let disallowed = state
            .actions
            .disallows
            .iter()
            .filter(|(_, disallowed)| **disallowed)
            .filter_map(|(name, _)| match name.parse() {
                Ok(transition) => Some(transition),
                Err(e) => {
                    trace!("{e}");
                    None
                }
            })
            .collect();

        Self {
            is_playing: state.is_playing,
            current_track: state.item.as_ref().map(TrackInfo::from),
            position: Duration::from_millis(state.progress_ms.unwrap_or_default()),
            disallowed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_true_disallows_are_kept() {
        let state: PlaybackState = serde_json::from_str(
            r#"{
                "is_playing": false,
                "progress_ms": 5000,
                "item": {"id": "t1", "uri": "spotify:track:t1", "name": "Song", "duration_ms": 200000,
                         "artists": [{"id": "a1", "uri": "spotify:artist:a1", "name": "Band"}],
                         "album": {"id": "al1", "uri": "spotify:album:al1", "name": "Record",
                                   "images": [{"url": "https://i.scdn.co/image/x", "width": 640, "height": 640}]}},
                "actions": {"disallows": {"skipping_next": true, "pausing": true, "seeking": false, "unknown_thing": true}}
            }"#,
        )
        .unwrap();

        let state = PlayerState::from(state);
        assert!(!state.allows(Transition::SkippingNext));
        assert!(!state.allows(Transition::Pausing));
        assert!(state.allows(Transition::Seeking));
        assert_eq!(state.disallowed.len(), 2);
        assert_eq!(state.position, Duration::from_secs(5));
        assert_eq!(state.duration(), Duration::from_secs(200));

        let track = state.current_track.unwrap();
        assert_eq!(track.to_string(), "Band - Song");
        assert_eq!(track.album.as_deref(), Some("Record"));
        assert_eq!(track.image.as_deref(), Some("https://i.scdn.co/image/x"));
    }

    #[test]
    fn transition_names() {
        assert_eq!(
            "skipping_prev".parse::<Transition>().unwrap(),
            Transition::SkippingPrev
        );
        assert_eq!(Transition::SkippingNext.to_string(), "skipping_next");
        assert!("skipping_sideways".parse::<Transition>().is_err());
    }
}
