use std::collections::HashSet;
use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use serde_json::Value;

use crate::{Download, NormalizedMedia};

static HTTP_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^https?://").unwrap());
static IMAGE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(jpg|jpeg|png|webp|gif)(\?|$)").unwrap());
static AUDIO_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(mp3|m4a|aac|ogg|wav)(\?|$)|audio").unwrap());
static VIDEO_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\.mp4(\?|$)|play|video").unwrap());

const DEFAULT_LABEL: &str = "Video";

/// A download derivation rule. Returns `Some` only with a non-empty list.
type Rule = fn(&Value, &[String]) -> Option<Vec<Download>>;

/// Tried in order; the first rule that yields anything wins.
const RULES: &[(&str, Rule)] = &[
    ("explicit", explicit_downloads),
    ("well-known", well_known_fields),
    ("detected", detected_urls),
];

/// Map an arbitrary upstream JSON response onto a [`NormalizedMedia`].
///
/// Never fails: anything missing from the response is simply missing from the
/// result. Pure, so the same input always produces the same output.
pub fn normalize(raw: &Value) -> NormalizedMedia {
    let payload = unwrap_envelope(raw);
    let urls = collect_urls(payload);

    let downloads = derive_downloads(payload, &urls);
    let audio_urls: Vec<String> = urls.iter().filter(|u| AUDIO_URL.is_match(u)).cloned().collect();
    let image_urls: Vec<String> = urls.iter().filter(|u| IMAGE_URL.is_match(u)).cloned().collect();

    NormalizedMedia {
        title: extract_title(payload),
        thumbnail_url: pick_thumbnail(payload, &urls),
        downloads,
        audio_url: audio_urls.first().cloned(),
        audio_urls,
        image_urls,
    }
}

/// Substitute `result` for the whole response when it is wrapped as `{ ok, result }`
pub fn unwrap_envelope(raw: &Value) -> &Value {
    match (raw.get("ok"), raw.get("result")) {
        (Some(ok), Some(result)) if truthy(ok) && truthy(result) => {
            debug!("Unwrapped {{ ok, result }} envelope");
            result
        }
        _ => raw,
    }
}

/// Collect every `http(s)://` string anywhere in the tree, in first-seen order
pub fn collect_urls(value: &Value) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    walk_urls(value, &mut seen, &mut urls);
    urls
}

// serde_json caps nesting at 128 levels while parsing, so recursion depth is bounded.
fn walk_urls(value: &Value, seen: &mut HashSet<String>, urls: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if HTTP_URL.is_match(s) && seen.insert(s.to_string()) {
                urls.push(s.to_string());
            }
        }
        Value::Array(items) => {
            for item in items {
                walk_urls(item, seen, urls);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                walk_urls(item, seen, urls);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn extract_title(payload: &Value) -> Option<String> {
    first_string(payload, &[&["title"], &["name"], &["desc"], &["data", "title"]])
}

fn pick_thumbnail(payload: &Value, urls: &[String]) -> Option<String> {
    first_string(
        payload,
        &[&["thumbnail"], &["cover"], &["data", "cover"], &["data", "thumbnail"]],
    )
    .or_else(|| urls.iter().find(|u| IMAGE_URL.is_match(u)).cloned())
}

fn derive_downloads(payload: &Value, urls: &[String]) -> Vec<Download> {
    for (name, rule) in RULES {
        if let Some(downloads) = rule(payload, urls) {
            debug!("Download rule '{name}' produced {} entries", downloads.len());
            return downloads;
        }
    }
    debug!("No download rule produced entries");
    Vec::new()
}

/// `downloads: [...]` as returned by APIs that already list their assets
fn explicit_downloads(payload: &Value, _urls: &[String]) -> Option<Vec<Download>> {
    let items = payload.get("downloads")?.as_array()?;
    non_empty(dedup_by_url(items.iter().filter_map(explicit_entry)))
}

fn explicit_entry(item: &Value) -> Option<Download> {
    match item {
        Value::String(s) => non_blank(s).map(|url| Download::new(DEFAULT_LABEL, url)),
        Value::Object(_) => {
            let url = first_string(item, &[&["url"], &["link"], &["src"]])?;
            let label = first_scalar(item, &["label", "quality", "name"]).unwrap_or_else(|| DEFAULT_LABEL.to_string());
            let size = first_scalar(item, &["size", "filesize"]);
            Some(Download::new(label, url).with_size(size))
        }
        _ => None,
    }
}

/// tikwm/douyin style single fields
fn well_known_fields(payload: &Value, _urls: &[String]) -> Option<Vec<Download>> {
    let size = first_scalar(payload, &["size"]);
    let play_addr = payload.get("video").and_then(|v| v.get("play_addr"));

    let candidates = [
        ("No Watermark", payload.get("play")),
        ("Watermark", payload.get("wmplay")),
        (DEFAULT_LABEL, play_addr),
    ];

    let found = candidates.into_iter().filter_map(|(label, field)| {
        let url = play_url(field?)?;
        Some(Download::new(label, url).with_size(size.clone()))
    });
    non_empty(dedup_by_url(found))
}

/// `play_addr` is either a plain URL or `{ "url_list": [...] }`
fn play_url(field: &Value) -> Option<String> {
    match field {
        Value::String(s) => non_blank(s),
        Value::Object(_) => field
            .get("url_list")?
            .as_array()?
            .iter()
            .find_map(|u| u.as_str().and_then(non_blank)),
        _ => None,
    }
}

/// Last resort: every URL that looks like video, or every URL at all
fn detected_urls(_payload: &Value, urls: &[String]) -> Option<Vec<Download>> {
    let likely: Vec<&String> = urls.iter().filter(|u| VIDEO_URL.is_match(u)).collect();
    let chosen = if likely.is_empty() { urls.iter().collect::<Vec<_>>() } else { likely };

    non_empty(
        chosen
            .into_iter()
            .enumerate()
            .map(|(i, url)| Download::new(format!("Detected {}", i + 1), url.clone()))
            .collect(),
    )
}

fn dedup_by_url(downloads: impl Iterator<Item = Download>) -> Vec<Download> {
    let mut seen = HashSet::new();
    downloads.filter(|d| seen.insert(d.url.clone())).collect()
}

fn non_empty(downloads: Vec<Download>) -> Option<Vec<Download>> {
    if downloads.is_empty() { None } else { Some(downloads) }
}

fn non_blank(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}

/// First non-blank string found at any of the key paths
fn first_string(value: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| {
        let found = path.iter().try_fold(value, |v, key| v.get(key))?;
        found.as_str().and_then(non_blank)
    })
}

/// First non-blank string or number among the keys, as a string
fn first_scalar(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(key)? {
        Value::String(s) => non_blank(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn urls_of(media: &NormalizedMedia) -> Vec<&str> {
        media.downloads.iter().map(|d| d.url.as_str()).collect()
    }

    #[test]
    fn test_play_and_wmplay() {
        let raw = json!({ "play": "https://x/a.mp4", "wmplay": "https://x/b.mp4" });
        let media = normalize(&raw);
        assert_eq!(
            media.downloads,
            vec![
                Download::new("No Watermark", "https://x/a.mp4"),
                Download::new("Watermark", "https://x/b.mp4"),
            ]
        );
    }

    #[test]
    fn test_empty_downloads_falls_through_to_detection() {
        let raw = json!({ "downloads": [], "cover": "https://x/c.jpg", "foo": "https://x/d.mp4" });
        let media = normalize(&raw);
        assert_eq!(media.thumbnail_url.as_deref(), Some("https://x/c.jpg"));
        assert_eq!(media.downloads, vec![Download::new("Detected 1", "https://x/d.mp4")]);
    }

    #[test]
    fn test_empty_object() {
        let media = normalize(&json!({}));
        assert_eq!(media, NormalizedMedia::default());
        assert!(media.is_empty());
    }

    #[test]
    fn test_nested_data_title_and_cover() {
        let raw = json!({ "data": { "title": "T", "cover": "https://x/e.png" } });
        let media = normalize(&raw);
        assert_eq!(media.title.as_deref(), Some("T"));
        assert_eq!(media.thumbnail_url.as_deref(), Some("https://x/e.png"));
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let raw = json!({
            "ok": true,
            "result": {
                "title": "clip",
                "downloads": [{ "quality": "HD", "link": "https://x/hd.mp4", "filesize": 1024 }],
                "music": "https://x/m.mp3"
            }
        });
        assert_eq!(normalize(&raw), normalize(&raw));
    }

    #[test]
    fn test_unwrap_envelope() {
        let raw = json!({ "ok": true, "result": { "title": "inner" } });
        assert_eq!(unwrap_envelope(&raw), &json!({ "title": "inner" }));
    }

    #[test]
    fn test_unwrap_envelope_requires_truthy_ok() {
        let raw = json!({ "ok": false, "result": { "title": "inner" } });
        assert_eq!(unwrap_envelope(&raw), &raw);

        let raw = json!({ "ok": 1, "result": null });
        assert_eq!(unwrap_envelope(&raw), &raw);
    }

    #[test]
    fn test_unwrap_envelope_noop_on_plain_values() {
        for raw in [json!({}), json!([1, 2]), json!("https://x"), json!(null), json!({ "data": {} })] {
            assert_eq!(unwrap_envelope(&raw), &raw);
        }
    }

    #[test]
    fn test_title_priority() {
        let raw = json!({ "desc": "d", "name": "n", "data": { "title": "t" } });
        assert_eq!(normalize(&raw).title.as_deref(), Some("n"));

        let raw = json!({ "title": "", "desc": "d" });
        assert_eq!(normalize(&raw).title.as_deref(), Some("d"));
    }

    #[test]
    fn test_thumbnail_falls_back_to_scan() {
        let raw = json!({ "images": ["https://x/v.mp4", "https://x/p.WEBP?sig=1"] });
        assert_eq!(normalize(&raw).thumbnail_url.as_deref(), Some("https://x/p.WEBP?sig=1"));
    }

    #[test]
    fn test_thumbnail_flat_field_wins() {
        let raw = json!({ "cover": "https://x/cover.jpg", "thumbnail": "https://x/thumb.jpg" });
        assert_eq!(normalize(&raw).thumbnail_url.as_deref(), Some("https://x/thumb.jpg"));
    }

    #[test]
    fn test_explicit_downloads_mapping() {
        let raw = json!({
            "downloads": [
                { "label": "HD", "url": "https://x/hd.mp4", "size": "4 MB" },
                { "quality": 720, "src": "https://x/720.mp4", "filesize": 2048 },
                "https://x/raw.mp4",
                { "name": "no url" },
                { "url": "https://x/hd.mp4" }
            ],
            "play": "https://x/ignored.mp4"
        });
        let media = normalize(&raw);
        assert_eq!(
            media.downloads,
            vec![
                Download::new("HD", "https://x/hd.mp4").with_size(Some("4 MB".to_string())),
                Download::new("720", "https://x/720.mp4").with_size(Some("2048".to_string())),
                Download::new("Video", "https://x/raw.mp4"),
            ]
        );
    }

    #[test]
    fn test_play_addr_url_list() {
        let raw = json!({ "video": { "play_addr": { "url_list": ["", "https://x/p.mp4"] } }, "size": 99 });
        let media = normalize(&raw);
        assert_eq!(
            media.downloads,
            vec![Download::new("Video", "https://x/p.mp4").with_size(Some("99".to_string()))]
        );
    }

    #[test]
    fn test_well_known_fields_dedup() {
        let raw = json!({ "play": "https://x/a.mp4", "wmplay": "https://x/a.mp4" });
        assert_eq!(urls_of(&normalize(&raw)), vec!["https://x/a.mp4"]);
    }

    #[test]
    fn test_detection_prefers_video_like_urls() {
        let raw = json!({
            "author": { "avatar": "https://x/avatar.jpg" },
            "links": ["https://cdn/PlayBack?id=1", "https://x/a.mp4?t=2", "https://x/page"]
        });
        let media = normalize(&raw);
        assert_eq!(urls_of(&media), vec!["https://cdn/PlayBack?id=1", "https://x/a.mp4?t=2"]);
        assert_eq!(media.downloads[1].label, "Detected 2");
    }

    #[test]
    fn test_detection_falls_back_to_all_urls() {
        let raw = json!({ "a": "https://x/one", "b": ["https://x/two", "https://x/one"] });
        let media = normalize(&raw);
        assert_eq!(urls_of(&media), vec!["https://x/one", "https://x/two"]);
    }

    #[test]
    fn test_audio_and_image_subsets_overlap_downloads() {
        let raw = json!({
            "play": "https://x/a.mp4",
            "music": "https://x/track.m4a",
            "music_info": { "play": "https://x/audio/stream" },
            "images": ["https://x/1.png", "https://x/2.gif"]
        });
        let media = normalize(&raw);
        assert_eq!(media.audio_url.as_deref(), Some("https://x/track.m4a"));
        assert_eq!(media.audio_urls, vec!["https://x/track.m4a", "https://x/audio/stream"]);
        assert_eq!(media.image_urls, vec!["https://x/1.png", "https://x/2.gif"]);

        let raw = json!({ "x": "https://x/song.mp3" });
        let media = normalize(&raw);
        assert_eq!(urls_of(&media), vec!["https://x/song.mp3"]);
        assert_eq!(media.audio_urls, vec!["https://x/song.mp3"]);
    }

    #[test]
    fn test_tikwm_response() {
        let raw = json!({
            "code": 0,
            "msg": "success",
            "processed_time": 0.12,
            "data": {
                "id": "7301234567890",
                "title": "dance #fyp",
                "cover": "https://www.tikwm.com/video/cover/7301234567890.webp",
                "duration": 15,
                "play": "https://www.tikwm.com/video/media/play/7301234567890.mp4",
                "wmplay": "https://www.tikwm.com/video/media/wmplay/7301234567890.mp4",
                "size": 1843211,
                "music": "https://www.tikwm.com/video/music/7301234567890.mp3",
                "author": { "avatar": "https://www.tikwm.com/video/avatar/u1.jpeg" }
            }
        });
        let media = normalize(&raw);
        assert_eq!(media.title.as_deref(), Some("dance #fyp"));
        assert_eq!(
            media.thumbnail_url.as_deref(),
            Some("https://www.tikwm.com/video/cover/7301234567890.webp")
        );
        // Fields sit under `data`, so only URL detection finds them; every tikwm URL contains "video"
        assert_eq!(media.downloads.len(), 5);
        assert_eq!(media.downloads[1].url, "https://www.tikwm.com/video/media/play/7301234567890.mp4");
        assert_eq!(media.audio_url.as_deref(), Some("https://www.tikwm.com/video/music/7301234567890.mp3"));
        assert_eq!(media.image_urls.len(), 2);
    }

    #[test]
    fn test_collect_urls_skips_scalars_and_trims() {
        let raw = json!([null, true, 3.5, "  https://x/a  ", "ftp://x/b", "HTTP://X/C", { "k": "http://x/d" }]);
        assert_eq!(collect_urls(&raw), vec!["https://x/a", "HTTP://X/C", "http://x/d"]);
    }

    #[test]
    fn test_non_object_payload() {
        let media = normalize(&json!(["https://x/a.mp4"]));
        assert!(media.title.is_none());
        assert_eq!(urls_of(&media), vec!["https://x/a.mp4"]);
    }

    fn arb_json() -> impl Strategy<Value = serde_json::Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-z :/.]{0,12}".prop_map(Value::String),
            " ?(https?|HTTP)://[a-z]{1,6}/[a-z]{0,6}(\\.mp4|\\.jpg|\\.mp3)?".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 64, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::vec(("[a-z]{1,6}", inner), 0..6)
                    .prop_map(|pairs| Value::Object(pairs.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_collected_urls_are_http_and_unique(raw in arb_json()) {
            let urls = collect_urls(&raw);
            let unique: HashSet<&String> = urls.iter().collect();
            prop_assert_eq!(unique.len(), urls.len());
            for url in &urls {
                prop_assert!(HTTP_URL.is_match(url));
            }
        }

        #[test]
        fn prop_normalize_is_pure(raw in arb_json()) {
            prop_assert_eq!(normalize(&raw), normalize(&raw));
        }

        #[test]
        fn prop_downloads_have_unique_urls(raw in arb_json()) {
            let media = normalize(&raw);
            let unique: HashSet<&str> = media.downloads.iter().map(|d| d.url.as_str()).collect();
            prop_assert_eq!(unique.len(), media.downloads.len());
        }

        #[test]
        fn prop_unwrap_is_identity_without_envelope(raw in arb_json()) {
            prop_assume!(raw.get("result").is_none());
            prop_assert_eq!(unwrap_envelope(&raw), &raw);
        }
    }
}
