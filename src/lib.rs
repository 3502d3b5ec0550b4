pub mod api;
pub mod config;
pub mod download;
pub mod normalize;
pub mod output;

#[cfg(test)]
mod test_server;

use serde::Serialize;

pub use normalize::normalize;

/// A single downloadable asset discovered in an API response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Download {
    pub label: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl Download {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
            size: None,
        }
    }

    pub fn with_size(mut self, size: Option<String>) -> Self {
        self.size = size;
        self
    }
}

/// Canonical view of whatever the upstream API returned.
///
/// Every field is best effort: any of them may be missing, and a URL may be
/// classified under the wrong media kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizedMedia {
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
    pub downloads: Vec<Download>,
    pub audio_url: Option<String>,
    pub audio_urls: Vec<String>,
    pub image_urls: Vec<String>,
}

impl NormalizedMedia {
    /// True when no download link was found
    pub fn is_empty(&self) -> bool {
        self.downloads.is_empty()
    }
}
