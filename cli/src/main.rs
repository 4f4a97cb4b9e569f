/// Clearmark CLI - terminal frontend for the media-download and
/// watermark-removal backend.
mod view;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use clearmark_client::regions::NullRegionView;
use clearmark_client::tracker::run_session;
use clearmark_client::{
    BackendClient, ClientConfig, DownloadRequest, MediaType, RegionSelector, Tracker, Viewport,
};
use view::TerminalProgress;

#[derive(Parser)]
#[command(name = "clearmark", version, about = "Client for the Clearmark media-download backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch and print metadata for a video URL
    Info {
        url: String,
    },
    /// Download a video or audio track with live progress
    Download {
        url: String,
        /// Download the audio track only
        #[arg(long)]
        audio: bool,
        /// Target quality: "best", "720", "720p", ...
        #[arg(long, default_value = "best")]
        quality: String,
        /// Container format; defaults to mp4 (video) or mp3 (audio)
        #[arg(long)]
        format: Option<String>,
        /// Directory for the saved artifact
        #[arg(long)]
        output: Option<String>,
    },
    /// List downloadable posts from an Instagram profile
    Instagram {
        url: String,
    },
    /// Show how many videos the backend has cached
    CacheStatus,
    /// Select watermark regions on a local video and submit it for cleanup
    Watermark {
        /// Local video file to upload
        file: PathBuf,
        /// Intrinsic video size, e.g. 1920x1080
        #[arg(long, value_parser = parse_size)]
        frame: (u32, u32),
        /// On-screen rendered size, e.g. 960x540; defaults to the frame size
        #[arg(long, value_parser = parse_size)]
        display: Option<(u32, u32)>,
        /// One drag in display coordinates, "x1,y1:x2,y2" (repeatable)
        #[arg(long = "drag", value_name = "DRAG")]
        drags: Vec<String>,
        /// Drop the most recent region before submitting (repeatable)
        #[arg(long, action = clap::ArgAction::Count)]
        undo: u8,
        /// Print the serialized regions field without uploading
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clearmark_cli=info".parse().unwrap())
                .add_directive("clearmark_client=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env();

    match cli.command {
        Command::Info { url } => {
            let client = BackendClient::new(config)?;
            let info = client.fetch_video_info(&url).await?;
            println!("Title:    {}", info.title);
            println!("Uploader: {}", info.uploader);
            println!("Duration: {}", info.duration_display());
            println!("Views:    {}", info.view_count);
            if !info.thumbnail.is_empty() {
                println!("Thumb:    {}", info.thumbnail);
            }
            println!("Qualities:");
            for (value, label) in info.quality_options() {
                println!("  {:<6} {}", value, label);
            }
        }
        Command::Download { url, audio, quality, format, output } => {
            let config = match output {
                Some(dir) => config.with_download_dir(dir),
                None => config,
            };
            let client = BackendClient::new(config)?;

            let media_type = if audio { MediaType::Audio } else { MediaType::Video };
            let format = format.unwrap_or_else(|| {
                match media_type {
                    MediaType::Video => "mp4",
                    MediaType::Audio => "mp3",
                }
                .to_string()
            });
            let request = DownloadRequest::new(url, media_type, &quality, &format);

            // Ctrl-C cancels the session; in-flight work is abandoned, not
            // left to mutate the display later.
            let cancel = CancellationToken::new();
            let ctrlc = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Cancelling download...");
                    ctrlc.cancel();
                }
            });

            let mut tracker = Tracker::new();
            let mut progress = TerminalProgress::new();
            let result = run_session(&client, &mut tracker, &mut progress, &cancel, &request).await;
            progress.finish();
            match result {
                Ok(Some(path)) => println!("Saved to {}", path.display()),
                Ok(None) => println!("Download cancelled."),
                Err(e) => return Err(e.into()),
            }
        }
        Command::Instagram { url } => {
            let client = BackendClient::new(config)?;
            let content = client.instagram_download(&url).await?;
            println!("Profile: @{}", content.username);
            println!("Found {} posts", content.videos.len());
            for (index, post) in content.videos.iter().enumerate() {
                let extra = if post.additional_media.is_empty() {
                    String::new()
                } else {
                    format!(" (+{} more)", post.additional_media.len())
                };
                println!(
                    "{:>3}. [{}] {} {} views {}{}",
                    index + 1,
                    post.kind,
                    post.title,
                    post.view_count,
                    post.url,
                    extra
                );
            }
        }
        Command::CacheStatus => {
            let client = BackendClient::new(config)?;
            let status = client.cache_status().await?;
            println!("Cached videos: {}", status.cached_videos);
        }
        Command::Watermark { file, frame, display, drags, undo, dry_run } => {
            let client = BackendClient::new(config)?;
            let display = display.unwrap_or(frame);
            let mut selector = RegionSelector::new(NullRegionView);
            selector.set_viewport(Viewport::new(frame, (display.0 as f64, display.1 as f64)));

            for drag in &drags {
                let (from, to) = parse_drag(drag)?;
                selector.pointer_down(from.0, from.1);
                selector.pointer_up(to.0, to.1);
            }
            for _ in 0..undo {
                selector.undo();
            }

            // Empty selections are blocked here, before any upload.
            let field = selector.submit_field()?;
            println!("regions={}", field);
            if dry_run {
                return Ok(());
            }

            info!("Submitting {} for watermark removal", file.display());
            let ready = client.upload_video(&file, &field).await?;
            let path = client.save_artifact(&ready).await?;
            println!("Processed video saved to {}", path.display());
        }
    }

    Ok(())
}

/// Parse "WxH" into a size pair.
fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got '{}'", value))?;
    let w = w.trim().parse().map_err(|_| format!("bad width in '{}'", value))?;
    let h = h.trim().parse().map_err(|_| format!("bad height in '{}'", value))?;
    Ok((w, h))
}

/// Parse one drag "x1,y1:x2,y2" in display coordinates.
fn parse_drag(value: &str) -> anyhow::Result<((f64, f64), (f64, f64))> {
    let (from, to) = value
        .split_once(':')
        .with_context(|| format!("expected x1,y1:x2,y2, got '{}'", value))?;
    Ok((parse_point(from)?, parse_point(to)?))
}

fn parse_point(value: &str) -> anyhow::Result<(f64, f64)> {
    let (x, y) = value
        .split_once(',')
        .with_context(|| format!("expected x,y, got '{}'", value))?;
    Ok((x.trim().parse()?, y.trim().parse()?))
}
