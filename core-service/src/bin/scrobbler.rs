/// Scrobbler - Last.fm scrobbling for local desktop players
use anyhow::Context;
use clap::{Parser, Subcommand};
use core_library::repositories::PageRequest;
use core_playback::CancellationToken;
use core_runtime::config::ScrobblerConfig;
use core_runtime::logging::init_logging;
use core_library::analysis::ListeningReport;
use core_service::{bootstrap_desktop, ScrobblerService};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "scrobbler")]
#[command(about = "Scrobbles Audirvana and Roon plays to Last.fm", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SCROBBLER_CONFIG", default_value = "scrobbler.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor the configured players until interrupted
    Run,
    /// Submit listens that never reached Last.fm
    SyncRecords {
        /// Maximum records to submit
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },
    /// List the most played tracks
    Top {
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
        #[arg(short, long, default_value_t = 0)]
        offset: u32,
    },
    /// List recorded listens, newest first
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
        #[arg(short, long, default_value_t = 0)]
        offset: u32,
    },
    /// Print a listening report: track total, most played, latest listens
    Report {
        /// Repeat every N seconds until interrupted
        #[arg(short, long)]
        every: Option<u64>,
    },
    /// Suggest tracks from play counts and recent listening
    Recommend {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        /// Only suggest tracks by this artist
        #[arg(short, long)]
        artist: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = ScrobblerConfig::from_toml_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    init_logging(config.logging.to_logging_config())?;

    let service = bootstrap_desktop(config).await?;

    match cli.command {
        Commands::Run => run(&service).await?,
        Commands::SyncRecords { limit } => return sync_records(&service, limit).await,
        Commands::Top { limit, offset } => top(&service, limit, offset).await?,
        Commands::History { limit, offset } => history(&service, limit, offset).await?,
        Commands::Report { every: None } => print_report(&service.report().await?),
        Commands::Report { every: Some(secs) } => scheduled_report(&service, secs).await?,
        Commands::Recommend { limit, artist } => {
            recommend(&service, limit, artist.as_deref()).await?
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn run(service: &ScrobblerService) -> anyhow::Result<()> {
    let mut events = service.subscribe();
    let cancel = CancellationToken::new();
    let engine = service.start(cancel.clone()).await?;

    tracing::info!("Monitoring players, press Ctrl-C to stop");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("waiting for Ctrl-C")?;
                break;
            }
            event = events.recv() => match event {
                Ok(notification) => println!("{}", serde_json::to_string(&notification)?),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Notification output fell behind");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    tracing::info!("Shutting down");
    engine.shutdown().await;
    Ok(())
}

async fn sync_records(service: &ScrobblerService, limit: u32) -> anyhow::Result<ExitCode> {
    let report = service.sync_records(Some(limit)).await?;
    println!(
        "submitted: {}, failed: {}, still pending: {}",
        report.submitted, report.failed, report.remaining
    );

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn top(service: &ScrobblerService, limit: u32, offset: u32) -> anyhow::Result<()> {
    let page = service.top_plays(PageRequest::new(limit, offset)).await?;
    for row in &page.items {
        println!("{:>6}  {} - {} ({})", row.play_count, row.artist, row.track, row.album);
    }
    println!("{} of {} tracks", page.items.len(), page.total);
    Ok(())
}

async fn history(service: &ScrobblerService, limit: u32, offset: u32) -> anyhow::Result<()> {
    let page = service.history(PageRequest::new(limit, offset)).await?;
    for record in &page.items {
        let played = chrono::DateTime::<chrono::Utc>::from_timestamp(record.play_time, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| record.play_time.to_string());
        println!(
            "{}  {} {} - {} [{}]",
            played,
            if record.sent { "✓" } else { "…" },
            record.artist,
            record.track,
            record.source
        );
    }
    println!("{} of {} listens", page.items.len(), page.total);
    Ok(())
}

async fn scheduled_report(service: &ScrobblerService, secs: u64) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    tracing::info!(every_secs = secs, "Reporting on a schedule, press Ctrl-C to stop");
    service
        .run_report_schedule(Duration::from_secs(secs), cancel, |report| {
            print_report(&report);
            println!();
        })
        .await?;
    Ok(())
}

fn print_report(report: &ListeningReport) {
    println!("Tracks played: {}", report.total_tracks);

    println!("\nMost played:");
    for (rank, row) in report.top_tracks.iter().enumerate() {
        println!(
            "{:>3}. {} - {} - {} ({} plays)",
            rank + 1,
            row.artist,
            row.album,
            row.track,
            row.play_count
        );
    }

    println!("\nRecently played:");
    for (rank, record) in report.recent.iter().enumerate() {
        let played = chrono::DateTime::<chrono::Utc>::from_timestamp(record.play_time, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| record.play_time.to_string());
        println!(
            "{:>3}. {} - {} - {} ({})",
            rank + 1,
            record.artist,
            record.album,
            record.track,
            played
        );
    }
}

async fn recommend(
    service: &ScrobblerService,
    limit: usize,
    artist: Option<&str>,
) -> anyhow::Result<()> {
    let picks = service.recommend(limit, artist).await?;
    for (rank, pick) in picks.iter().enumerate() {
        println!(
            "{:>3}. {} - {} - {} (score {:.2})",
            rank + 1,
            pick.artist,
            pick.album,
            pick.track,
            pick.score
        );
    }
    Ok(())
}
