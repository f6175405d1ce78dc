//! The user's catalogue: profile, playlists, saved and recent tracks,
//! search and browse.
//!
//! All reads go through the [`Gate`], so they share its token renewal and
//! connection tracking with the device controller.

use std::{collections::HashSet, fmt::Debug, sync::Arc};

use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::{Error, ErrorKind, Result},
    gate::Gate,
    protocol::web::{
        AddTracks, Artist, Categories, Category, CreatePlaylist, FeaturedPlaylists, Paging,
        PlayHistory, Playlist, PlaylistItem, SavedTrack, SearchResults, Snapshot, TopTracks,
        Track, User,
    },
};

pub struct Library {
    gate: Arc<Gate>,
}

impl Library {
    /// Maximum number of URIs the provider accepts per playlist addition.
    pub const ADD_TRACKS_CHUNK: usize = 100;

    /// Market for artist top tracks.
    const MARKET: &'static str = "US";

    #[must_use]
    pub fn new(gate: Arc<Gate>) -> Self {
        Self { gate }
    }

    async fn get<T>(&self, path: String, query: Vec<(&'static str, String)>) -> Result<T>
    where
        T: for<'de> Deserialize<'de> + Debug,
    {
        let value = self
            .gate
            .call(|api, token| {
                let path = path.clone();
                let query = query.clone();
                async move { api.get(&token, &path, &query).await }
            })
            .await?;
        decode(value, &path)
    }

    async fn post<T>(&self, path: String, body: Value) -> Result<T>
    where
        T: for<'de> Deserialize<'de> + Debug,
    {
        let value = self
            .gate
            .call(|api, token| {
                let path = path.clone();
                let body = body.clone();
                async move { api.post(&token, &path, &body).await }
            })
            .await?;
        decode(value, &path)
    }

    pub async fn profile(&self) -> Result<User> {
        self.get("me".to_owned(), Vec::new()).await
    }

    /// The user's playlists, each listed once.
    pub async fn playlists(&self, limit: u8) -> Result<Vec<Playlist>> {
        let page: Paging<Playlist> = self
            .get("me/playlists".to_owned(), vec![("limit", limit.to_string())])
            .await?;

        let mut seen = HashSet::new();
        Ok(page
            .items
            .into_iter()
            .filter(|playlist| seen.insert(playlist.id.clone()))
            .collect())
    }

    pub async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<PlaylistItem>> {
        let page: Paging<PlaylistItem> = self
            .get(
                format!("playlists/{}/tracks", id(playlist_id)?),
                Vec::new(),
            )
            .await?;
        Ok(page.items)
    }

    /// Liked songs, most recently saved first.
    pub async fn saved_tracks(&self, limit: u8) -> Result<Vec<SavedTrack>> {
        let page: Paging<SavedTrack> = self
            .get("me/tracks".to_owned(), vec![("limit", limit.to_string())])
            .await?;
        Ok(page.items)
    }

    pub async fn top_artists(&self) -> Result<Vec<Artist>> {
        let page: Paging<Artist> = self.get("me/top/artists".to_owned(), Vec::new()).await?;
        Ok(page.items)
    }

    /// Recently played tracks, each track listed once at its latest play.
    pub async fn recently_played(&self) -> Result<Vec<PlayHistory>> {
        let page: Paging<PlayHistory> = self
            .get("me/player/recently-played".to_owned(), Vec::new())
            .await?;

        let mut seen = HashSet::new();
        Ok(page
            .items
            .into_iter()
            .filter(|item| seen.insert(item.track.id.clone()))
            .collect())
    }

    pub async fn featured_playlists(&self) -> Result<Vec<Playlist>> {
        let featured: FeaturedPlaylists = self
            .get("browse/featured-playlists".to_owned(), Vec::new())
            .await?;
        Ok(featured.playlists.items)
    }

    pub async fn search_tracks(&self, query: &str) -> Result<Vec<Track>> {
        let results: SearchResults = self.search(query, "track").await?;
        Ok(results.tracks.map(|page| page.items).unwrap_or_default())
    }

    pub async fn search_artists(&self, query: &str) -> Result<Vec<Artist>> {
        let results: SearchResults = self.search(query, "artist").await?;
        Ok(results.artists.map(|page| page.items).unwrap_or_default())
    }

    async fn search(&self, query: &str, kind: &str) -> Result<SearchResults> {
        if query.trim().is_empty() {
            return Err(Error::invalid_argument("search query is empty"));
        }

        self.get(
            "search".to_owned(),
            vec![("q", query.to_owned()), ("type", kind.to_owned())],
        )
        .await
    }

    pub async fn categories(&self) -> Result<Vec<Category>> {
        let categories: Categories = self.get("browse/categories".to_owned(), Vec::new()).await?;
        Ok(categories.categories.items)
    }

    pub async fn artist(&self, artist_id: &str) -> Result<Artist> {
        self.get(format!("artists/{}", id(artist_id)?), Vec::new())
            .await
    }

    pub async fn artist_top_tracks(&self, artist_id: &str) -> Result<Vec<Track>> {
        let top: TopTracks = self
            .get(
                format!("artists/{}/top-tracks", id(artist_id)?),
                vec![("market", Self::MARKET.to_owned())],
            )
            .await?;
        Ok(top.tracks)
    }

    /// Creates a private playlist owned by the current user.
    pub async fn create_playlist(&self, name: &str, description: Option<&str>) -> Result<Playlist> {
        if name.trim().is_empty() {
            return Err(Error::invalid_argument("playlist name is empty"));
        }

        let user = self.profile().await?;
        let body = serde_json::to_value(CreatePlaylist {
            name,
            description: description.filter(|description| !description.is_empty()),
            public: false,
        })?;

        let playlist: Playlist = self
            .post(format!("users/{}/playlists", id(&user.id)?), body)
            .await?;
        info!("created playlist {}", playlist.name);
        Ok(playlist)
    }

    /// Appends tracks to a playlist, in as many requests as the provider's
    /// per-request limit requires. Returns the playlist snapshot after the
    /// last request.
    pub async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<Option<String>> {
        let path = format!("playlists/{}/tracks", id(playlist_id)?);

        let mut snapshot = None;
        for chunk in uris.chunks(Self::ADD_TRACKS_CHUNK) {
            let body = serde_json::to_value(AddTracks { uris: chunk })?;
            let response: Snapshot = self.post(path.clone(), body).await?;
            snapshot = Some(response.snapshot_id);
        }

        debug!("added {} tracks to {playlist_id}", uris.len());
        Ok(snapshot)
    }
}

/// Provider ids are alphanumeric; anything else would escape the path.
fn id(id: &str) -> Result<&str> {
    if id.is_empty() || !id.chars().all(|chr| chr.is_ascii_alphanumeric()) {
        return Err(Error::invalid_argument(format!("invalid id: {id:?}")));
    }
    Ok(id)
}

fn decode<T>(value: Value, origin: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    match serde_json::from_value(value) {
        Ok(result) => {
            trace!("{origin}: {result:#?}");
            Ok(result)
        }
        Err(e) => {
            error!("{origin}: failed parsing response ({e})");
            Err(Error::new(ErrorKind::Upstream(None), e))
        }
    }
}
