//! Provider Web API resources.
//!
//! Only the fields that playdeck reads are modelled; unknown fields are
//! ignored. Identifiers are opaque strings, and the provider may return
//! `null` for any of them on local or unavailable items.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull};

/// A playback endpoint registered with the provider.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct Device {
    /// `None` for restricted devices that cannot be controlled.
    pub id: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_restricted: bool,
    #[serde(default)]
    pub is_private_session: bool,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub volume_percent: Option<u8>,
    #[serde(default)]
    pub supports_volume: bool,
}

impl Device {
    #[must_use]
    pub fn has_id(&self, device_id: &str) -> bool {
        self.id.as_deref() == Some(device_id)
    }
}

/// Response of `GET me/player/devices`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct Devices {
    #[serde(default)]
    pub devices: Vec<Device>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct Actions {
    /// Transitions keyed by name, `true` when disallowed.
    #[serde(default)]
    pub disallows: HashMap<String, bool>,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct Context {
    pub uri: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Response of `GET me/player`.
#[serde_as]
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct PlaybackState {
    pub device: Option<Device>,
    #[serde(default)]
    pub is_playing: bool,
    pub progress_ms: Option<u64>,
    pub item: Option<Track>,
    pub context: Option<Context>,
    #[serde(default)]
    pub shuffle_state: bool,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub actions: Actions,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct Image {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct SimpleArtist {
    pub id: Option<String>,
    pub uri: Option<String>,
    pub name: String,
}

#[serde_as]
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct SimpleAlbum {
    pub id: Option<String>,
    pub uri: Option<String>,
    pub name: String,
    pub release_date: Option<String>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub images: Vec<Image>,
}

#[serde_as]
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct Track {
    pub id: Option<String>,
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub explicit: bool,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub artists: Vec<SimpleArtist>,
    pub album: Option<SimpleAlbum>,
}

impl Track {
    /// Artist names joined for display.
    #[must_use]
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|artist| artist.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct Followers {
    pub total: u64,
}

#[serde_as]
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct Artist {
    pub id: String,
    pub uri: String,
    pub name: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub genres: Vec<String>,
    pub popularity: Option<u32>,
    pub followers: Option<Followers>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct User {
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub country: Option<String>,
    /// Subscription level, `premium` is required for streaming.
    pub product: Option<String>,
    pub uri: Option<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct TracksRef {
    pub total: u64,
}

#[serde_as]
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub uri: String,
    pub name: String,
    pub description: Option<String>,
    pub public: Option<bool>,
    pub owner: Option<PlaylistOwner>,
    pub tracks: Option<TracksRef>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub images: Vec<Image>,
    pub snapshot_id: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct PlaylistOwner {
    pub id: String,
    pub display_name: Option<String>,
}

/// An entry of a playlist. `track` is `None` for removed items.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct PlaylistItem {
    pub added_at: Option<String>,
    pub track: Option<Track>,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct SavedTrack {
    pub added_at: String,
    pub track: Track,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct PlayHistory {
    pub track: Track,
    pub played_at: String,
    pub context: Option<Context>,
}

#[serde_as]
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub icons: Vec<Image>,
}

/// A page of results.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct Paging<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
    pub next: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct Categories {
    pub categories: Paging<Category>,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct FeaturedPlaylists {
    pub message: Option<String>,
    pub playlists: Paging<Playlist>,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct TopTracks {
    pub tracks: Vec<Track>,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct SearchResults {
    pub tracks: Option<Paging<Track>>,
    pub artists: Option<Paging<Artist>>,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct Snapshot {
    pub snapshot_id: String,
}

/// Body of `PUT me/player/play`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct PlayRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uris: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_ms: Option<u64>,
}

impl PlayRequest {
    /// Resumes whatever the device has queued.
    #[must_use]
    pub fn resume() -> Self {
        Self::default()
    }

    /// Plays `uri`: a single track for track URIs, otherwise the album,
    /// playlist or artist it names.
    #[must_use]
    pub fn for_uri(uri: &str) -> Self {
        if is_track_uri(uri) {
            Self {
                uris: Some(vec![uri.to_owned()]),
                ..Self::default()
            }
        } else {
            Self {
                context_uri: Some(uri.to_owned()),
                ..Self::default()
            }
        }
    }
}

/// Track URIs look like `spotify:track:<id>`.
#[must_use]
pub fn is_track_uri(uri: &str) -> bool {
    uri.split(':').nth(1) == Some("track")
}

/// Body of `PUT me/player`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct TransferRequest<'a> {
    pub device_ids: [&'a str; 1],
    pub play: bool,
}

/// Body of `POST users/{user_id}/playlists`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct CreatePlaylist<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
    pub public: bool,
}

/// Body of `POST playlists/{playlist_id}/tracks`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct AddTracks<'a> {
    pub uris: &'a [String],
}

/// Provider failure body: `{"error": {"status": 401, "message": "..."}}`.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct ErrorDetail {
    pub status: u16,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playback_state_reads_disallows() {
        let state: PlaybackState = serde_json::from_str(
            r#"{
                "device": {"id": "abc", "is_active": true, "name": "playdeck", "type": "Computer", "volume_percent": 40},
                "is_playing": true,
                "progress_ms": 1200,
                "item": {"id": "t1", "uri": "spotify:track:t1", "name": "Song", "duration_ms": 180000,
                         "artists": [{"id": "a1", "uri": "spotify:artist:a1", "name": "Band"}], "album": null},
                "actions": {"disallows": {"skipping_prev": true, "resuming": true}}
            }"#,
        )
        .unwrap();

        assert!(state.is_playing);
        assert_eq!(state.progress_ms, Some(1200));
        assert_eq!(state.item.unwrap().artist_names(), "Band");
        assert_eq!(state.actions.disallows.get("skipping_prev"), Some(&true));
        assert!(state.device.unwrap().has_id("abc"));
    }

    #[test]
    fn null_collections_default_to_empty() {
        let playlist: Playlist = serde_json::from_str(
            r#"{"id": "p1", "uri": "spotify:playlist:p1", "name": "Mix", "images": null}"#,
        )
        .unwrap();
        assert!(playlist.images.is_empty());
    }

    #[test]
    fn play_request_by_uri_kind() {
        let track = serde_json::to_value(PlayRequest::for_uri("spotify:track:t1")).unwrap();
        assert_eq!(track, serde_json::json!({"uris": ["spotify:track:t1"]}));

        let album = serde_json::to_value(PlayRequest::for_uri("spotify:album:a1")).unwrap();
        assert_eq!(album, serde_json::json!({"context_uri": "spotify:album:a1"}));

        let resume = serde_json::to_value(PlayRequest::resume()).unwrap();
        assert_eq!(resume, serde_json::json!({}));
    }
}
