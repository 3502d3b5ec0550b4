use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Result, bail};
use log::{debug, info, warn};

use vidgrab::api::{self, FetchError};
use vidgrab::config::{ApiConfig, Config};
use vidgrab::download::{self, SaveKinds, SaveOutcome};

mod cli;

use cli::{Cli, OutputFormat};

fn setup_logging() -> Result<()> {
    let log_dir = log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_file = log_dir.join("vidgrab.log");

    let target = Box::new(std::fs::OpenOptions::new().create(true).append(true).open(&log_file)?);

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized: {}", log_file.display());
    Ok(())
}

fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vidgrab")
        .join("logs")
}

fn build_after_help() -> String {
    let config_path = vidgrab::config::config_path();
    let config_line = if config_path.exists() {
        format!("  \x1b[32m✅\x1b[0m {}", config_path.display())
    } else {
        format!("  \x1b[33m–\x1b[0m {} (not found, using defaults)", config_path.display())
    };

    let log_path = log_dir().join("vidgrab.log");

    format!(
        "\nCONFIG:\n{config_line}\n\nDefault endpoint: {}\nLogs are written to: {}",
        vidgrab::config::DEFAULT_ENDPOINT,
        log_path.display()
    )
}

/// Retry an async operation with exponential backoff
async fn retry<F, Fut, T, E>(max_attempts: u32, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) if attempt + 1 < max_attempts => {
                let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                debug!("Attempt {} failed: {e}, retrying in {delay:?}", attempt + 1);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// CLI flags take priority over the config file
fn resolve_api_config(cli: &Cli, config: &Config) -> ApiConfig {
    let mut settings = config.api_config();
    if let Some(ref endpoint) = cli.endpoint {
        settings.endpoint = endpoint.clone();
    }
    if let Some(ref proxy) = cli.proxy {
        settings.proxy = Some(proxy.clone()).filter(|p| !p.trim().is_empty());
    }
    if let Some(secs) = cli.timeout {
        settings.timeout = Some(Duration::from_secs(secs)).filter(|d| !d.is_zero());
    }
    if let Some(retries) = cli.retries {
        settings.attempts = retries.max(1);
    }
    settings
}

fn emit(cli: &Cli, rendered: &str) -> Result<()> {
    if let Some(ref path) = cli.output {
        std::fs::write(path, rendered)?;
        if cli.verbose {
            eprintln!("Output written to: {}", path.display());
        }
    } else {
        println!("{rendered}");
    }
    Ok(())
}

async fn lookup(client: &reqwest::Client, settings: &ApiConfig, cli: &Cli, dir: &Path, input: &str) -> Result<()> {
    let url = api::checked_input(input)?;

    if cli.verbose {
        eprintln!("Requesting: {}", api::request_url(settings, url));
    }

    let raw = retry(settings.attempts, move || api::fetch_info(client, settings, url)).await?;

    if cli.raw {
        return emit(cli, &serde_json::to_string_pretty(&raw)?);
    }

    let media = vidgrab::normalize(&raw);
    if media.is_empty() {
        warn!("No downloads detected in response for {url}: {raw}");
        if cli.verbose {
            eprintln!("Raw API response:\n{}", serde_json::to_string_pretty(&raw)?);
        }
        return Err(FetchError::NoMedia.into());
    }

    if cli.verbose {
        eprintln!(
            "Title: {}\nDownloads: {}\nAudio: {}\nImages: {}",
            media.title.as_deref().unwrap_or("(none)"),
            media.downloads.len(),
            media.audio_urls.len(),
            media.image_urls.len(),
        );
    }

    let rendered = match cli.format {
        OutputFormat::Text => vidgrab::output::render_text(&media),
        OutputFormat::Json => vidgrab::output::render_json(&media),
        OutputFormat::Urls => vidgrab::output::render_urls(&media),
    };
    emit(cli, &rendered)?;

    if cli.open {
        if let Some(first) = media.downloads.first() {
            if let Err(e) = open::that(&first.url) {
                warn!("Could not open {}: {e}", first.url);
                eprintln!("Could not open browser: {e}");
            }
        }
    }

    let kinds = SaveKinds {
        downloads: cli.download,
        audio: cli.audio,
        images: cli.images,
    };
    let requests = download::plan_saves(&media, kinds, dir);
    if requests.is_empty() {
        return Ok(());
    }

    let mut failed = 0;
    for (url, outcome) in download::save_all(client, requests).await {
        match outcome {
            SaveOutcome::Saved(path) => eprintln!("Saved {}", path.display()),
            SaveOutcome::Opened => eprintln!("Download failed, opened in browser: {url}"),
            SaveOutcome::Failed(reason) => {
                eprintln!("Download failed: {url}: {reason}");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{failed} download(s) failed");
    }
    Ok(())
}

fn report(err: &eyre::Report) -> String {
    match err.downcast_ref::<FetchError>() {
        Some(fetch_err) => {
            if let Some(body) = fetch_err.raw_body() {
                debug!("Upstream raw: {body}");
            }
            api::user_message(fetch_err)
        }
        None => format!("Error: {err:#}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging()?;

    let after_help = build_after_help();
    let cmd = <Cli as clap::CommandFactory>::command().after_help(after_help);
    let matches = cmd.get_matches();
    let cli = <Cli as clap::FromArgMatches>::from_arg_matches(&matches)?;

    // Load config file (non-fatal if missing/invalid)
    let config = Config::load().unwrap_or_else(|e| {
        warn!("Ignoring config file: {e}");
        Config::default()
    });

    let settings = resolve_api_config(&cli, &config);
    let dir = cli.dir.clone().unwrap_or_else(|| config.download_dir());
    debug!("API config: {settings:?}, download dir: {}", dir.display());

    if cli.verbose {
        let config_path = vidgrab::config::config_path();
        if config_path.exists() {
            eprintln!("Config: {}", config_path.display());
        }
    }

    let client = reqwest::Client::new();

    // Collect URLs: from arg or stdin
    let urls = if let Some(ref url) = cli.url {
        vec![url.clone()]
    } else {
        let stdin = io::stdin();
        stdin.lock().lines().collect::<Result<Vec<_>, _>>()?
    };

    if urls.iter().all(|u| u.trim().is_empty()) {
        bail!("no video URL provided\n\nUsage: vidgrab <URL>\n       echo <URL> | vidgrab");
    }

    let mut failures = 0;
    for url_input in urls.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
        if let Err(e) = lookup(&client, &settings, &cli, &dir, url_input).await {
            warn!("Lookup failed for {url_input}: {e:#}");
            eprintln!("{url_input}: {}", report(&e));
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{failures} of {} URL(s) failed", urls.iter().filter(|u| !u.trim().is_empty()).count());
    }

    Ok(())
}
