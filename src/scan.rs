use async_trait::async_trait;
use log::{debug, info};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::snippet::EncodedSnippet;

/// Multipart field the scan endpoint reads the snippet from.
pub const AUDIO_FILE_FIELD: &str = "audioFile";

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{message} (status {status})")]
    Service { status: u16, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid scan response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlatformLinks {
    pub spotify: Option<String>,
    pub apple_music: Option<String>,
    pub youtube: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanMatch {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub release_date: String,
    pub platform_links: Option<PlatformLinks>,
    pub match_confidence: f64,
    pub spotify_artist_id: Option<String>,
    pub spotify_track_id: Option<String>,
    pub stream_count: Option<u64>,
    pub stream_count_timestamp: Option<String>,
    pub cover_art_url: Option<String>,
    pub stream_clout_album_id: Option<String>,
    pub stream_clout_track_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnippetScanResult {
    pub scan_id: String,
    pub instrumental_name: String,
    pub instrumental_size: u64,
    pub scan_date: String,
    #[serde(default)]
    pub matches: Vec<ScanMatch>,
    pub error_message: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Maps a scan endpoint response onto a result or a typed error. Error
/// bodies of the form `{"message": "..."}` supply the message; anything
/// else falls back to the status line.
pub fn interpret_response(status: StatusCode, body: &str) -> Result<SnippetScanResult, ScanError> {
    if status.is_success() {
        return Ok(serde_json::from_str(body)?);
    }

    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| {
            format!(
                "Error scanning file: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )
            .trim_end()
            .to_string()
        });

    Err(match status {
        StatusCode::BAD_REQUEST => ScanError::BadRequest(message),
        StatusCode::PAYLOAD_TOO_LARGE => ScanError::PayloadTooLarge(message),
        _ => ScanError::Service {
            status: status.as_u16(),
            message,
        },
    })
}

/// Where prepared snippets go once a file has been processed.
#[async_trait]
pub trait SnippetSink: Send + Sync {
    type Receipt: Send;
    type Error: std::fmt::Display + Send;

    async fn deliver(&self, snippet: EncodedSnippet) -> Result<Self::Receipt, Self::Error>;
}

/// Client for the scan submission endpoint.
pub struct ScanClient {
    http: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl ScanClient {
    pub fn new(endpoint: impl Into<String>, auth_token: Option<String>) -> ScanClient {
        ScanClient {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            auth_token,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn scan(&self, snippet: EncodedSnippet) -> Result<SnippetScanResult, ScanError> {
        let size = snippet.bytes.len();
        let part = Part::bytes(snippet.bytes)
            .file_name(snippet.file_name.clone())
            .mime_str(snippet.media_type)?;
        let form = Form::new().part(AUDIO_FILE_FIELD, part);

        let mut req = self.http.post(&self.endpoint).multipart(form);
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }

        debug!("submitting {} ({} bytes) to {}", snippet.file_name, size, self.endpoint);
        let res = req.send().await?;
        let status = res.status();
        let body = res.text().await?;

        let result = interpret_response(status, &body)?;
        info!(
            "scan {} for {}: {} match(es)",
            result.scan_id,
            snippet.file_name,
            result.matches.len()
        );
        Ok(result)
    }
}

#[async_trait]
impl SnippetSink for ScanClient {
    type Receipt = SnippetScanResult;
    type Error = ScanError;

    async fn deliver(&self, snippet: EncodedSnippet) -> Result<SnippetScanResult, ScanError> {
        self.scan(snippet).await
    }
}
