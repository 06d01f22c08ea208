mod error;

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use nicodl_engine::config::{DEFAULT_CHUNK_SIZE, DEFAULT_SESSION_API_BASE};
use nicodl_engine::{
    DownloadProgress, Mode, NicoConfig, SessionController, create_client, fetch_video_info,
    normalize_watch_url,
};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::error::{AppError, Result};

#[derive(Parser, Debug)]
#[command(name = "nicodl", author, version, about = "Download niconico videos", long_about = None)]
struct Args {
    /// Watch page URL or bare video id (e.g. sm9)
    url: Option<String>,

    /// Output file
    #[arg(short, long, default_value = "output.mp4")]
    output: PathBuf,

    /// Delivery mode: direct-http or segmented-stream
    #[arg(short, long, default_value = "direct-http")]
    mode: Mode,

    /// Maximum bytes handed to the output file per write
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Print the decoded watch page record as JSON instead of downloading
    #[arg(long)]
    info: bool,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors and hide the progress bar
    #[arg(short, long)]
    quiet: bool,

    /// Timeout in seconds for page and session requests
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Session API endpoint
    #[arg(long, env = "NICODL_API_BASE", default_value = DEFAULT_SESSION_API_BASE)]
    api_base: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let Some(input) = args.url.as_deref() else {
        Args::command().print_help()?;
        println!();
        return Ok(());
    };

    init_logging(args.verbose, args.quiet);

    if args.chunk_size == 0 {
        return Err(AppError::InvalidInput(
            "chunk size must be at least 1 byte".to_string(),
        ));
    }

    let config = build_config(&args);
    let client = create_client(&config)?;

    let url = normalize_watch_url(input)?;
    let video = fetch_video_info(&client, &config, &url).await?;

    if args.info {
        println!("{}", serde_json::to_string_pretty(&video.data)?);
        return Ok(());
    }

    info!(
        video_id = video.video_id().unwrap_or_default(),
        title = video.title().unwrap_or_default(),
        mode = %args.mode,
        "Video found"
    );

    let metadata = video.source_metadata()?;
    let controller = SessionController::new(client, &config, &metadata, args.mode)?;

    let pb = progress_bar(args.quiet)?;
    let output = args.output.as_path();

    let download = controller.with_session(async |c| {
        c.download_to_path(output, |progress| update_progress(&pb, progress))
            .await
    });

    let written = tokio::select! {
        result = download => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, closing session");
            pb.abandon_with_message("Interrupted");
            controller.close().await;
            return Err(AppError::Interrupted);
        }
    };

    pb.finish_with_message("Done");
    info!(
        path = %output.display(),
        size = %HumanBytes(written),
        "Download complete"
    );
    Ok(())
}

fn build_config(args: &Args) -> NicoConfig {
    let timeout = Duration::from_secs(args.timeout);
    let config = NicoConfig::builder()
        .with_session_api_base(args.api_base.as_str())
        .with_session_timeout(timeout)
        .with_page_timeout(timeout)
        .with_chunk_size(args.chunk_size)
        .build();
    debug!(?config, "Configuration resolved");
    config
}

fn progress_bar(quiet: bool) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}",
        )?
        .progress_chars("=> "),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

fn update_progress(pb: &ProgressBar, progress: DownloadProgress) {
    match progress.total {
        Some(total) if pb.length() != Some(total) => pb.set_length(total),
        Some(_) => {}
        // Unknown size: keep the bar one step ahead so it never looks finished.
        None => pb.set_length(progress.written + 1),
    }
    pb.set_position(progress.written);
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_level(verbose))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["nicodl", "sm9"]).unwrap();
        assert_eq!(args.url.as_deref(), Some("sm9"));
        assert_eq!(args.output, PathBuf::from("output.mp4"));
        assert_eq!(args.mode, Mode::DirectHttp);
        assert_eq!(args.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(!args.info);
    }

    #[test]
    fn url_is_optional() {
        let args = Args::try_parse_from(["nicodl"]).unwrap();
        assert!(args.url.is_none());
    }

    #[test]
    fn mode_accepts_wire_names_and_aliases() {
        let args = Args::try_parse_from(["nicodl", "sm9", "--mode", "segmented-stream"]).unwrap();
        assert_eq!(args.mode, Mode::SegmentedStream);
        let args = Args::try_parse_from(["nicodl", "sm9", "-m", "hls_parameters"]).unwrap();
        assert_eq!(args.mode, Mode::SegmentedStream);
        assert!(Args::try_parse_from(["nicodl", "sm9", "--mode", "rtmp"]).is_err());
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Args::try_parse_from(["nicodl", "sm9", "-v", "-q"]).is_err());
    }

    #[test]
    fn flags_reach_the_config() {
        let args = Args::try_parse_from([
            "nicodl",
            "sm9",
            "--chunk-size",
            "4096",
            "--timeout",
            "5",
            "--api-base",
            "http://127.0.0.1:9000/api/sessions/",
        ])
        .unwrap();
        let config = build_config(&args);
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.session_timeout, Duration::from_secs(5));
        assert_eq!(config.page_timeout, Duration::from_secs(5));
        assert_eq!(config.session_api_base, "http://127.0.0.1:9000/api/sessions");
    }

    #[test]
    fn unknown_length_never_completes_the_bar() {
        let pb = ProgressBar::hidden();
        update_progress(
            &pb,
            DownloadProgress {
                written: 10,
                total: None,
            },
        );
        assert_eq!(pb.position(), 10);
        assert_eq!(pb.length(), Some(11));

        update_progress(
            &pb,
            DownloadProgress {
                written: 10,
                total: Some(20),
            },
        );
        assert_eq!(pb.length(), Some(20));
    }
}
