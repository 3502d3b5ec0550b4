use std::collections::HashSet;
use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use log::{debug, warn};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;

use crate::NormalizedMedia;

const FALLBACK_EXT: &str = "mp4";

/// Result of trying to save one asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(PathBuf),
    /// Saving failed; the original URL was opened in the browser instead
    Opened,
    Failed(String),
}

/// A single asset to save
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub url: String,
    pub dest: PathBuf,
}

/// Which parts of a [`NormalizedMedia`] to save
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveKinds {
    pub downloads: bool,
    pub audio: bool,
    pub images: bool,
}

/// Turn the selected assets into save requests under `dir`.
///
/// A URL found in several buckets is saved once. Every request gets its own
/// file name, since labels repeat and concurrent tasks must never share a file.
pub fn plan_saves(media: &NormalizedMedia, kinds: SaveKinds, dir: &Path) -> Vec<SaveRequest> {
    let mut candidates: Vec<(String, &str)> = Vec::new();
    if kinds.downloads {
        candidates.extend(media.downloads.iter().map(|d| (d.label.clone(), d.url.as_str())));
    }
    if kinds.audio {
        candidates.extend(media.audio_urls.iter().enumerate().map(|(i, url)| (format!("audio {}", i + 1), url.as_str())));
    }
    if kinds.images {
        candidates.extend(media.image_urls.iter().enumerate().map(|(i, url)| (format!("image {}", i + 1), url.as_str())));
    }

    let title = media.title.as_deref();
    let mut seen_urls = HashSet::new();
    let mut used_names = HashSet::new();
    candidates
        .into_iter()
        .filter(|(_, url)| seen_urls.insert(*url))
        .map(|(label, url)| {
            let name = unique_name(file_name_for(title, &label, url), &mut used_names);
            SaveRequest {
                url: url.to_string(),
                dest: dir.join(name),
            }
        })
        .collect()
}

/// `name`, or `stem-2.ext`, `stem-3.ext`, ... when already taken
fn unique_name(name: String, used: &mut HashSet<String>) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), format!(".{ext}")),
        None => (name.clone(), String::new()),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{stem}-{n}{ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Fetch `url` and write it to `dest`, streaming chunk by chunk
pub async fn save(client: &reqwest::Client, url: &str, dest: &Path) -> Result<PathBuf> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    debug!("Downloading {url} -> {}", dest.display());
    match write_body(client, url, dest).await {
        Ok(bytes) => {
            debug!("Saved {bytes} bytes to {}", dest.display());
            Ok(dest.to_path_buf())
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(dest).await;
            Err(e)
        }
    }
}

async fn write_body(client: &reqwest::Client, url: &str, dest: &Path) -> Result<u64> {
    let mut resp = client
        .get(url)
        .send()
        .await
        .wrap_err_with(|| format!("failed to fetch {url}"))?
        .error_for_status()?;

    let mut file = tokio::fs::File::create(dest)
        .await
        .wrap_err_with(|| format!("failed to create {}", dest.display()))?;

    let mut written = 0u64;
    while let Some(chunk) = resp.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Save `url` to `dest`, opening it in the browser if the download fails
pub async fn save_or_open(client: &reqwest::Client, url: &str, dest: &Path) -> SaveOutcome {
    match save(client, url, dest).await {
        Ok(path) => SaveOutcome::Saved(path),
        Err(e) => {
            warn!("Download of {url} failed: {e:#}; opening in browser");
            match open::that(url) {
                Ok(()) => SaveOutcome::Opened,
                Err(open_err) => SaveOutcome::Failed(format!("{e:#}; could not open browser: {open_err}")),
            }
        }
    }
}

/// Run every request as its own task. Results come back in completion order.
pub async fn save_all(client: &reqwest::Client, requests: Vec<SaveRequest>) -> Vec<(String, SaveOutcome)> {
    let mut tasks = JoinSet::new();
    for req in requests {
        let client = client.clone();
        tasks.spawn(async move {
            let outcome = save_or_open(&client, &req.url, &req.dest).await;
            (req.url, outcome)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => warn!("Download task failed to complete: {e}"),
        }
    }
    results
}

/// Build a filesystem-safe file name: `<title>-<label>.<ext>`
pub fn file_name_for(title: Option<&str>, label: &str, url: &str) -> String {
    let title = title.map(slug).filter(|s| !s.is_empty()).unwrap_or_else(|| "video".to_string());
    let label = slug(label);
    let ext = extension_of(url);

    if label.is_empty() {
        format!("{title}.{ext}")
    } else {
        format!("{title}-{label}.{ext}")
    }
}

fn extension_of(url: &str) -> String {
    let path = url::Url::parse(url).map(|u| u.path().to_string()).unwrap_or_default();
    let last = path.rsplit('/').next().unwrap_or("");
    match last.rsplit_once('.') {
        Some((_, ext)) if is_plain_ext(ext) => ext.to_lowercase(),
        Some(_) => "bin".to_string(),
        None => FALLBACK_EXT.to_string(),
    }
}

fn is_plain_ext(ext: &str) -> bool {
    !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Lowercase, collapse anything non-alphanumeric to single dashes, cap the length
fn slug(s: &str) -> String {
    let mut out = String::new();
    for c in s.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed: String = out.trim_end_matches('-').chars().take(60).collect();
    trimmed.trim_end_matches('-').to_string()
}
