//! Command-line front end for the weather poster.
//!
//! Every subcommand forwards to one core operation and prints its plain
//! result. `run` is the long-lived daemon; the others are one-shot.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use background_service::{
    BackgroundService, FeedService, PublishPipeline, Scheduler, ServiceHandle,
};
use bluesky_client::{InteractionCache, SessionClient};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use database::Database;
use tracing_subscriber::EnvFilter;
use weather_core::{
    ActivityLog, Clock, ErrorReporter, LogKind, PosterConfig, PublishOutcome, ReqwestTransport,
    SystemClock,
};
use weather_feed::{TelemetryParser, USER_AGENT};

/// Post weather station readings to Bluesky on a schedule.
#[derive(Debug, Parser)]
#[command(name = "weather-poster", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, global = true, default_value = "weather-poster.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the scheduler until interrupted with Ctrl-C.
    ///
    /// On Unix, SIGHUP rereads the configuration file and reschedules.
    Run,

    /// Fetch, compose and publish one update right away.
    PostNow,

    /// Print replies to the most recent post.
    Feed {
        /// Number of replies to show (1-20). Defaults to `feed_limit`.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Print one of the activity logs, oldest first.
    Logs {
        #[arg(value_enum, default_value_t = LogChoice::Debug)]
        which: LogChoice,
    },

    /// Show the triggers the current configuration produces.
    Schedule,

    /// Empty the debug log.
    ClearLog,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogChoice {
    Debug,
    Upload,
}

impl From<LogChoice> for LogKind {
    fn from(choice: LogChoice) -> Self {
        match choice {
            LogChoice::Debug => LogKind::Debug,
            LogChoice::Upload => LogKind::Upload,
        }
    }
}

fn load_config(path: &Path) -> Result<PosterConfig> {
    let mut config = if path.exists() {
        PosterConfig::load(path)?
    } else {
        eprintln!(
            "No configuration at {}, using defaults and environment",
            path.display()
        );
        PosterConfig::default()
    };
    config.apply_env_overrides();
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Rereads the configuration file on every SIGHUP and hands it to the
/// running service. A file that fails to load leaves the old schedule in place.
#[cfg(unix)]
fn reload_on_hangup(path: PathBuf, handle: ServiceHandle) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to listen for SIGHUP")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            match load_config(&path) {
                Ok(config) => {
                    tracing::info!("Reloaded configuration from {}", path.display());
                    handle.reconfigure(config);
                }
                Err(e) => tracing::error!("Keeping the current configuration: {:#}", e),
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn reload_on_hangup(_path: PathBuf, _handle: ServiceHandle) -> Result<()> {
    Ok(())
}

fn print_outcome(outcome: &PublishOutcome) {
    println!("{}", outcome.message);
    if let Some(text) = &outcome.post_text {
        println!("\n{}", text);
    }
    if let Some(uri) = &outcome.post_uri {
        println!("\n{}", uri);
    }
    if let Some(hint) = &outcome.hint {
        match &outcome.error_code {
            Some(code) => eprintln!("{} [{}]", hint, code),
            None => eprintln!("{}", hint),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    tracing::info!("Starting weather-poster");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let log = Arc::new(ActivityLog::new(clock.clone()));

    let db = Arc::new(
        Database::open(config.database_url.as_str())
            .await
            .context("Failed to open the state database")?,
    );
    log.load_from(&db).await;

    // The station feed is often served with a self-signed certificate.
    let feed_transport = ReqwestTransport::without_tls_verification(USER_AGENT)?;
    let api_transport = ReqwestTransport::new(USER_AGENT)?;
    let client = Arc::new(SessionClient::new(
        api_transport,
        config.api_base.clone(),
        clock.clone(),
        log.clone(),
    ));
    let pipeline = PublishPipeline::new(
        TelemetryParser::new(feed_transport, log.clone()),
        client.clone(),
        db.clone(),
        log.clone(),
        clock.clone(),
    );

    match cli.command {
        Command::Run => {
            let scheduler = Scheduler::new(clock.clone(), log.clone());
            let (service, handle) = BackgroundService::new(pipeline, scheduler, config);
            reload_on_hangup(cli.config.clone(), handle)?;
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
                tracing::info!("Shutdown requested");
            };
            service.run(shutdown).await?;
        }
        Command::PostNow => {
            // print_outcome reports the failure itself.
            let pipeline =
                pipeline.with_reporter(ErrorReporter::new().with_error_reporting(false));
            let outcome = pipeline.run(&config).await;
            print_outcome(&outcome);
            if !outcome.success {
                log.flush_to(&db).await;
                bail!("Post failed");
            }
        }
        Command::Feed { limit } => {
            let cache = InteractionCache::new(client, clock.clone(), log.clone());
            let feed = FeedService::new(cache, db.clone());
            println!("{}", feed.render(&config, limit).await);
        }
        Command::Logs { which } => {
            let entries = log.entries(which.into());
            if entries.is_empty() {
                println!("No log entries.");
            }
            for entry in entries {
                let time = entry.time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S");
                match entry.status {
                    Some(status) => println!("{} [{}] {}", time, status, entry.message),
                    None => println!("{} {}", time, entry.message),
                }
            }
        }
        Command::Schedule => {
            let mut scheduler = Scheduler::new(clock.clone(), log.clone());
            match scheduler.configure(&config.schedule_config()) {
                Ok(_) => {
                    for trigger in scheduler.triggers() {
                        println!(
                            "{} {:?}",
                            trigger.fire_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                            trigger.recurrence
                        );
                    }
                }
                Err(e) => println!("Not scheduled: {}", e),
            }
        }
        Command::ClearLog => {
            log.clear_debug();
            println!("Debug log cleared.");
        }
    }

    log.flush_to(&db).await;
    db.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_picks_up_edits() {
        let path = std::env::temp_dir().join(format!(
            "weather-poster-reload-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "post_times = \"08:00\"\n").unwrap();
        assert_eq!(load_config(&path).unwrap().post_times, "08:00");

        std::fs::write(&path, "post_times = \"\"\npost_interval_minutes = 45\n").unwrap();
        let reloaded = load_config(&path).unwrap();
        assert_eq!(reloaded.post_times, "");
        assert_eq!(reloaded.post_interval_minutes, 45);

        std::fs::write(&path, "telemetry_url = \"not a url\"\n").unwrap();
        assert!(load_config(&path).is_err());

        let _ = std::fs::remove_file(&path);
    }
}
