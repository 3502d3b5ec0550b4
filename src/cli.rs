use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Urls,
}

#[derive(Parser)]
#[command(
    name = "vidgrab",
    about = "Resolve download links for short-video URLs",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// Video URL (reads one per line from stdin if omitted)
    pub url: Option<String>,

    /// Output format: text (default), json, urls
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Write output to file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Save every download link to disk
    #[arg(short, long)]
    pub download: bool,

    /// Also save detected audio
    #[arg(long)]
    pub audio: bool,

    /// Also save detected images
    #[arg(long)]
    pub images: bool,

    /// Open the first download link in the browser
    #[arg(long)]
    pub open: bool,

    /// Directory for saved files
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Video info API endpoint; the video URL is appended URL-encoded
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Relay prefix to route API requests through
    #[arg(long)]
    pub proxy: Option<String>,

    /// Give up on the API after this many seconds (waits indefinitely by default)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Attempts per API request
    #[arg(long)]
    pub retries: Option<u32>,

    /// Print the raw API response instead of the normalized view
    #[arg(long)]
    pub raw: bool,

    /// Show request details and raw payloads on failure
    #[arg(short, long)]
    pub verbose: bool,
}
