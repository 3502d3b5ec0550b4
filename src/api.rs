use log::debug;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::ApiConfig;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

const CORS_HINT: &str = "request blocked by a cross-origin (CORS) policy; \
route it through a server-side proxy that adds CORS headers (--proxy or `proxy` in config.toml)";

/// Failures at the upstream boundary
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("enter a video URL first")]
    EmptyInput,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("failed to reach API: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}")]
    Status { status: StatusCode, body: String },

    #[error("upstream returned non-JSON response")]
    NotJson { body: String },

    #[error("no download links found in API response")]
    NoMedia,
}

impl FetchError {
    /// Raw upstream body, when the failure carried one
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            FetchError::Status { body, .. } | FetchError::NotJson { body } => Some(body.as_str()),
            _ => None,
        }
    }
}

/// Message to show the user for a failed lookup
pub fn user_message(err: &FetchError) -> String {
    let mentions_cors = |s: &str| s.to_lowercase().contains("cors");
    if mentions_cors(&err.to_string()) || err.raw_body().is_some_and(mentions_cors) {
        return format!("Error: {CORS_HINT}");
    }
    format!("Error: {err}")
}

/// Check user input before any request goes out
pub fn validate_input(input: &str) -> Result<Url, FetchError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(FetchError::EmptyInput);
    }
    Url::parse(input).map_err(|_| FetchError::InvalidUrl(input.to_string()))
}

/// Validate `input` and return it trimmed but otherwise exactly as typed.
///
/// `Url` normalizes (host case, trailing slash), and upstream should see what the user pasted.
pub fn checked_input(input: &str) -> Result<&str, FetchError> {
    validate_input(input)?;
    Ok(input.trim())
}

/// Build the request URL, wrapping it in the proxy when one is configured
pub fn request_url(config: &ApiConfig, video_url: &str) -> String {
    let target = format!("{}{}", config.endpoint, encode(video_url));
    match &config.proxy {
        Some(proxy) => format!("{proxy}{}", encode(&target)),
        None => target,
    }
}

// Escapes everything but `A-Za-z0-9-_.~`; stricter than a browser's
// encodeURIComponent on `!'()*`, which upstream decodes to the same value.
fn encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Ask the video info API about `video_url` and return its JSON untouched
pub async fn fetch_info(client: &reqwest::Client, config: &ApiConfig, video_url: &str) -> Result<Value, FetchError> {
    let endpoint = request_url(config, video_url);
    debug!("Requesting video info: {endpoint}");

    let mut request = client.get(&endpoint).header("User-Agent", USER_AGENT);
    if let Some(timeout) = config.timeout {
        request = request.timeout(timeout);
    }

    let resp = request.send().await?;
    let status = resp.status();
    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    debug!("API responded {status} ({content_type})");

    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(FetchError::Status { status, body });
    }

    // Some APIs label JSON as text/html, so parse regardless of content type
    let body = resp.text().await?;
    parse_body(body)
}

fn parse_body(body: String) -> Result<Value, FetchError> {
    match serde_json::from_str(&body) {
        Ok(json) => Ok(json),
        Err(e) => {
            debug!("Body is not JSON: {e}");
            Err(FetchError::NotJson { body })
        }
    }
}
