use std::future::Future;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

pub const SPOTIFY_ACCOUNTS_URL: &str = "https://accounts.spotify.com/api/token";
pub const SPOTIFY_API_URL: &str = "https://api.spotify.com/v1";

/// Tokens are treated as expired this long before Spotify says they are.
const EARLY_REFRESH_SECONDS: i64 = 300;

#[derive(Error, Debug)]
pub enum SpotifyError {
    #[error("spotify artist id is required")]
    MissingArtistId,

    #[error("spotify authentication failed: {0}")]
    Auth(String),

    #[error("artist with id '{0}' not found on spotify")]
    NotFound(String),

    #[error("spotify api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Deserialize, Debug, Clone)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// An access token and its expiry, shared by every request of one client.
///
/// The lock is held while refreshing so concurrent callers on a cold cache
/// wait for a single fetch instead of each starting their own.
#[derive(Debug, Default)]
pub struct TokenCache {
    inner: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> TokenCache {
        TokenCache::default()
    }

    pub async fn get_or_refresh<F, Fut, E>(&self, fetch: F) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken, E>>,
    {
        self.get_or_refresh_at(Utc::now(), fetch).await
    }

    async fn get_or_refresh_at<F, Fut, E>(&self, now: DateTime<Utc>, fetch: F) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken, E>>,
    {
        let mut cached = self.inner.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > now {
                return Ok(token.token.clone());
            }
            debug!("cached spotify token expired at {}", token.expires_at);
        }

        let fresh = fetch().await?;
        let expires_at = now + Duration::seconds(fresh.expires_in - EARLY_REFRESH_SECONDS);
        *cached = Some(CachedToken {
            token: fresh.access_token.clone(),
            expires_at,
        });
        Ok(fresh.access_token)
    }

    pub async fn invalidate(&self) {
        *self.inner.lock().await = None;
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ArtistDetails {
    pub followers: Option<u64>,
    pub popularity: u32,
    pub genres: Vec<String>,
}

#[derive(Deserialize)]
struct Followers {
    total: Option<u64>,
}

#[derive(Deserialize)]
struct SpotifyArtist {
    followers: Option<Followers>,
    #[serde(default)]
    popularity: u32,
    #[serde(default)]
    genres: Vec<String>,
}

#[derive(Deserialize)]
struct SpotifyErrorBody {
    error: Option<SpotifyErrorDetail>,
}

#[derive(Deserialize)]
struct SpotifyErrorDetail {
    message: Option<String>,
}

fn api_error(status: StatusCode, body: &str, artist_id: &str) -> SpotifyError {
    if status == StatusCode::NOT_FOUND {
        return SpotifyError::NotFound(artist_id.to_string());
    }
    let message = match serde_json::from_str::<SpotifyErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
    {
        Some(message) => format!("Spotify API: {}", message),
        None => format!(
            "Failed to fetch artist details from Spotify: {}",
            status.canonical_reason().unwrap_or("unknown status")
        ),
    };
    SpotifyError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Client-credentials access to the Spotify Web API.
pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    tokens: TokenCache,
    accounts_url: String,
    api_url: String,
}

impl SpotifyClient {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> SpotifyClient {
        SpotifyClient {
            http: reqwest::Client::new(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            tokens: TokenCache::new(),
            accounts_url: SPOTIFY_ACCOUNTS_URL.into(),
            api_url: SPOTIFY_API_URL.into(),
        }
    }

    fn basic_auth(&self) -> String {
        let credentials = format!("{}:{}", self.client_id, self.client_secret);
        format!("Basic {}", STANDARD.encode(credentials))
    }

    async fn fetch_token(&self) -> Result<AccessToken, SpotifyError> {
        let res = self
            .http
            .post(&self.accounts_url)
            .header(AUTHORIZATION, self.basic_auth())
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(SpotifyError::Auth(
                status.canonical_reason().unwrap_or("unknown status").to_string(),
            ));
        }
        info!("fetched new spotify access token");
        Ok(res.json().await?)
    }

    pub async fn artist_details(&self, artist_id: &str) -> Result<ArtistDetails, SpotifyError> {
        if artist_id.is_empty() {
            return Err(SpotifyError::MissingArtistId);
        }

        let token = self.tokens.get_or_refresh(|| self.fetch_token()).await?;
        let res = self
            .http
            .get(format!("{}/artists/{}", self.api_url, artist_id))
            .bearer_auth(token)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(api_error(status, &body, artist_id));
        }

        let artist: SpotifyArtist = res.json().await?;
        Ok(ArtistDetails {
            followers: artist.followers.and_then(|f| f.total),
            popularity: artist.popularity,
            genres: artist.genres,
        })
    }
}
