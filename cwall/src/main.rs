//! cwall - publish a folder of screenshots to Google Drive and Instagram

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use libcwall::config::{resolve_config_path, Config};
use libcwall::logging::{self, LogFormat};
use libcwall::platforms::drive::{DriveStore, TokenFileProvider};
use libcwall::platforms::instagram::GraphClient;
use libcwall::platforms::SocialPublisher;
use libcwall::quota::QuotaTracker;
use libcwall::{scan_items, CwallError, ItemState, Pipeline, Shutdown, StateLog};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cwall")]
#[command(version)]
#[command(about = "Publish a folder of screenshots to Google Drive and Instagram")]
#[command(long_about = "\
cwall - Publish a folder of screenshots to Google Drive and Instagram

DESCRIPTION:
    New screenshots (IMG*.jpg) in the watch directory are padded to a square,
    uploaded to a Google Drive folder and then posted to Instagram, at most
    as many per day as the publishing limit allows (50).

    State lives in the watch directory itself:
        IMG001.jpg                                   new capture
        discard/IMG001.jpg                           original after processing
        IMG001-<drive id>.JPEG                       uploaded, waiting to be posted
        cwall_image_archive/<YYYY-MM-DD>/<file>      posted

USAGE:
    cwall run                  # upload, wait 30s, publish
    cwall run --t 60           # same with a 60s wait
    cwall publish_to_google    # upload only
    cwall publish_to_ins       # publish only
    cwall quota                # today's publishing limit usage
    cwall status               # items by state
    cwall set_token            # store a fresh Instagram access token

CONFIGURATION:
    Configuration file: ~/.config/cwall/config.toml (or $CWALL_CONFIG)

SIGNALS:
    SIGTERM, SIGINT - Stop at the next wait or between items; a second
                      signal exits immediately

EXIT CODES:
    0   - Success
    1   - Runtime error
    2   - Authentication error
    3   - Malformed state
    4   - Quota unavailable
    130 - Interrupted
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (overrides $CWALL_CONFIG)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format: text, json or pretty
    #[arg(long, global = true, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Square new screenshots and upload them to Google Drive
    #[command(name = "publish_to_google", alias = "publish-to-google")]
    PublishToGoogle,

    /// Post uploaded screenshots to Instagram within today's quota
    #[command(name = "publish_to_ins", alias = "publish-to-ins")]
    PublishToIns,

    /// Print the content publishing limit usage (max 50/day)
    Quota,

    /// Upload, wait, then publish
    Run {
        /// Seconds to wait between uploading and publishing
        #[arg(long = "t", visible_alias = "delay", value_name = "SECONDS")]
        t: Option<u64>,
    },

    /// Show items by pipeline state, from the state log
    Status {
        /// List the items in one state (raw, uploaded, quarantined, published, failed)
        #[arg(long)]
        state: Option<ItemState>,
    },

    /// Store a new Instagram access token in the configuration file
    #[command(name = "set_token", alias = "set-token")]
    SetToken {
        /// Read the token from stdin instead of prompting
        #[arg(long)]
        stdin: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::from_env(cli.log_format, cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<CwallError>()
            .map(CwallError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => resolve_config_path()?,
    };
    let config = Config::load_from_path(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let shutdown = Shutdown::new();
    setup_signal_handlers(&shutdown)?;

    match cli.command {
        Commands::PublishToGoogle => {
            let pipeline = Pipeline::from_config(&config, shutdown);
            let summary = pipeline.upload().await?;
            println!(
                "Processed {} files ({} uploaded, {} failed, {} skipped)",
                summary.discovered, summary.uploaded, summary.failed, summary.skipped
            );
        }
        Commands::PublishToIns => {
            let pipeline = checked_pipeline(&config, shutdown).await?;
            let summary = pipeline.publish().await?;
            println!(
                "Published {} posts. Remaining quota: {}",
                summary.published, summary.remaining
            );
            warn_unarchived(summary.unarchived);
        }
        Commands::Quota => {
            let publisher = Arc::new(GraphClient::new(&config.instagram));
            ensure_valid_token(&*publisher).await?;
            let window = QuotaTracker::new(publisher, config.pipeline.daily_cap)
                .window()
                .await?;
            println!("Used quota: {}", window.used);
            println!("Remaining: {} of {} ({})", window.remaining(), window.cap, window.date);
            if window.is_exhausted() {
                println!("Daily limit reached; uploaded items wait for tomorrow");
            }
        }
        Commands::Run { t } => {
            let delay = t
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.pipeline.inter_stage_delay());
            let pipeline = checked_pipeline(&config, shutdown).await?;
            let summary = pipeline.run_full_cycle(delay).await?;

            println!(
                "Uploaded {} of {} new files",
                summary.upload.uploaded, summary.upload.discovered
            );
            match summary.publish {
                Some(publish) => {
                    println!(
                        "Published {} posts. {} files remain unprocessed. Remaining quota: {}",
                        publish.published,
                        publish.failed + publish.pending,
                        publish.remaining
                    );
                    warn_unarchived(publish.unarchived);
                }
                None => println!("Publishing skipped: quota unavailable"),
            }
        }
        Commands::Status { state } => print_status(&config.watch_dir(), state)?,
        Commands::SetToken { stdin } => set_token(&config, &config_path, stdin).await?,
    }

    Ok(())
}

fn warn_unarchived(count: usize) {
    if count > 0 {
        eprintln!(
            "Warning: {} posted files could not be archived and would be posted again; move them into today's archive folder",
            count
        );
    }
}

/// Pipeline with the real collaborators, after checking the Instagram token
async fn checked_pipeline(config: &Config, shutdown: Shutdown) -> Result<Pipeline> {
    let publisher = Arc::new(GraphClient::new(&config.instagram));
    ensure_valid_token(&*publisher).await?;

    Ok(Pipeline::new(
        config,
        Arc::new(TokenFileProvider::new(config.token_file())),
        Arc::new(DriveStore::new()),
        publisher,
        shutdown,
    ))
}

async fn ensure_valid_token(publisher: &dyn SocialPublisher) -> Result<()> {
    if publisher.validate_token().await {
        return Ok(());
    }
    Err(CwallError::Auth(format!(
        "The {} access token is invalid or expired. Run `cwall set_token` to store a new one.",
        publisher.name()
    ))
    .into())
}

fn print_status(watch_dir: &Path, filter: Option<ItemState>) -> Result<()> {
    let log = StateLog::for_watch_dir(watch_dir);

    if let Some(state) = filter {
        for record in log.in_state(state)? {
            match record.remote_id {
                Some(id) => println!("{}\t{}\t{}", record.item, id, record.file),
                None => println!("{}\t-\t{}", record.item, record.file),
            }
        }
        return Ok(());
    }

    let on_disk = scan_items(watch_dir)?;
    let logged = log.latest()?;
    let states = [
        ItemState::Raw,
        ItemState::Quarantined,
        ItemState::Uploaded,
        ItemState::Failed,
        ItemState::Published,
    ];

    println!("{:<12}{:<9}{}", "state", "on disk", "logged");
    for state in states {
        let disk_count = on_disk.iter().filter(|item| item.state == state).count();
        let log_count = logged.values().filter(|r| r.state == state).count();
        println!("{:<12}{:<9}{}", state, disk_count, log_count);
    }
    Ok(())
}

async fn set_token(config: &Config, config_path: &Path, from_stdin: bool) -> Result<()> {
    let token = if from_stdin {
        use std::io::Read;
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        rpassword::prompt_password("Instagram access token: ")?
    };
    let token = token.trim().to_string();
    if token.is_empty() {
        anyhow::bail!("Access token cannot be empty");
    }

    let updated = config.with_access_token(token);
    ensure_valid_token(&GraphClient::new(&updated.instagram)).await?;
    updated
        .save_to_path(config_path)
        .with_context(|| format!("Failed to save {}", config_path.display()))?;

    info!("Stored new access token in {}", config_path.display());
    println!("Access token updated");
    Ok(())
}

/// Flip the shutdown flag on SIGINT/SIGTERM
#[cfg(unix)]
fn setup_signal_handlers(shutdown: &Shutdown) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::sync::atomic::Ordering;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Signal setup failed")?;

    let flag = shutdown.flag();
    std::thread::spawn(move || {
        for signal in signals.forever() {
            if flag.swap(true, Ordering::Relaxed) {
                eprintln!("Received signal {} again, exiting now", signal);
                std::process::exit(CwallError::Cancelled.exit_code());
            }
            info!(
                "Received signal {}, stopping at the next safe point (repeat to exit now)...",
                signal
            );
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_shutdown: &Shutdown) -> Result<()> {
    Ok(())
}
