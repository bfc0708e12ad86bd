//! Spotify Web API lookups used to turn a track link into a search query.

use super::FetchError;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const ACCOUNTS_URL: &str = "https://accounts.spotify.com";
const API_URL: &str = "https://api.spotify.com/v1";

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Track {
    name: String,
    #[serde(default)]
    artists: Vec<Artist>,
}

pub struct SpotifyClient {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    accounts_url: String,
    api_url: String,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> Result<Self, FetchError> {
        Self::with_endpoints(client_id, client_secret, ACCOUNTS_URL, API_URL)
    }

    pub fn with_endpoints(
        client_id: String,
        client_secret: String,
        accounts_url: &str,
        api_url: &str,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| FetchError::Resolve(e.to_string()))?;
        Ok(Self {
            client,
            client_id,
            client_secret,
            accounts_url: accounts_url.trim_end_matches('/').to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    async fn access_token(&self) -> Result<String, FetchError> {
        let response = self
            .client
            .post(format!("{}/api/token", self.accounts_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| FetchError::Resolve(format!("Spotify token request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(FetchError::Resolve(format!(
                "Spotify token request failed with status {}",
                response.status()
            )));
        }
        let token: AccessToken = response
            .json()
            .await
            .map_err(|e| FetchError::Resolve(format!("Unreadable Spotify token: {}", e)))?;
        Ok(token.access_token)
    }

    /// Returns `"<track name> <first artist>"` for a track link.
    pub async fn search_query(&self, track_url: &str) -> Result<String, FetchError> {
        let track_id = track_id_from_url(track_url)
            .ok_or_else(|| FetchError::Unsupported(format!("Not a Spotify track: {}", track_url)))?;
        let token = self.access_token().await?;

        let response = self
            .client
            .get(format!("{}/tracks/{}", self.api_url, track_id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| FetchError::Resolve(format!("Spotify track lookup failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(FetchError::Resolve(format!(
                "Spotify track {} lookup failed with status {}",
                track_id,
                response.status()
            )));
        }
        let track: Track = response
            .json()
            .await
            .map_err(|e| FetchError::Resolve(format!("Unreadable Spotify track: {}", e)))?;

        let query = match track.artists.first() {
            Some(artist) => format!("{} {}", track.name, artist.name),
            None => track.name,
        };
        debug!("Spotify track {} resolved to query '{}'", track_id, query);
        Ok(query)
    }
}

/// The last path segment of the link, without query string.
pub fn track_id_from_url(url: &str) -> Option<String> {
    let without_query = url.split('?').next()?;
    let id = without_query.trim_end_matches('/').rsplit('/').next()?;
    if id.is_empty() || id.contains(':') {
        None
    } else {
        Some(id.to_string())
    }
}
