use crate::NormalizedMedia;

/// Render media as a readable summary (title, thumbnail, one line per link)
pub fn render_text(media: &NormalizedMedia) -> String {
    let mut lines = Vec::new();

    if let Some(ref title) = media.title {
        lines.push(title.clone());
    }
    if let Some(ref thumb) = media.thumbnail_url {
        lines.push(format!("Thumbnail: {thumb}"));
    }
    if !lines.is_empty() {
        lines.push(String::new());
    }

    let width = media.downloads.iter().map(|d| d.label.chars().count()).max().unwrap_or(0);
    for d in &media.downloads {
        let mut line = format!("{:<width$}  {}", d.label, d.url);
        if let Some(ref size) = d.size {
            line.push_str(&format!("  [{size}]"));
        }
        lines.push(line);
    }

    if let Some(ref audio) = media.audio_url {
        lines.push(format!("Audio: {audio}"));
    }
    for image in &media.image_urls {
        lines.push(format!("Image: {image}"));
    }

    lines.join("\n")
}

/// Render media as pretty-printed JSON
pub fn render_json(media: &NormalizedMedia) -> String {
    serde_json::to_string_pretty(media).unwrap_or_default()
}

/// Download URLs only, one per line
pub fn render_urls(media: &NormalizedMedia) -> String {
    media
        .downloads
        .iter()
        .map(|d| d.url.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
