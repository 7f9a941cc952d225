// Scheduler command-line trigger

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::bootstrap;
use common::config::Settings;
use common::cron::{AccessKey, CronDaemon, CronOptions, CronTrigger, LightweightCron};
use common::models::Process;
use common::telemetry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "scheduler", about = "Scheduled publishing and unpublishing of content")]
struct Cli {
    /// Configuration directory
    #[arg(long, default_value = "config")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the lightweight cron once: publish then unpublish
    Cron {
        /// Suppress the start/complete notices
        #[arg(long)]
        nolog: bool,
    },
    /// Run only the publish pass
    Publish,
    /// Run only the unpublish pass
    Unpublish,
    /// Run the lightweight cron on the configured poll interval
    Daemon,
    /// Print a newly generated cron access key
    AccessKey,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::AccessKey = cli.command {
        println!("{}", AccessKey::generate());
        return Ok(());
    }

    let settings = Settings::load_from_path(&cli.config).context("Failed to load configuration")?;
    settings
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid configuration")?;

    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.tracing_endpoint.as_deref(),
    )?;

    info!(
        redis_lock = !settings.redis.url.is_empty(),
        poll_interval_seconds = settings.cron.poll_interval_seconds,
        "Configuration loaded"
    );

    let cron = bootstrap::init_cron(&settings).await?;

    let result = match cli.command {
        Command::Cron { nolog } => {
            let report = cron
                .run(CronTrigger::CommandLine, CronOptions { nolog })
                .await
                .context("Lightweight cron run failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Publish | Command::Unpublish => {
            let process = if matches!(cli.command, Command::Publish) {
                Process::Publish
            } else {
                Process::Unpublish
            };
            let report = cron
                .run_process(CronTrigger::CommandLine, process)
                .await
                .with_context(|| format!("Scheduled {} failed", process))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Daemon => {
            telemetry::init_metrics(settings.observability.metrics_port)?;
            run_daemon(cron, Duration::from_secs(settings.cron.poll_interval_seconds)).await
        }
        Command::AccessKey => Ok(()),
    };

    telemetry::shutdown_tracer();
    result
}

async fn run_daemon(cron: Arc<LightweightCron>, poll_interval: Duration) -> Result<()> {
    let daemon = Arc::new(CronDaemon::new(cron, poll_interval));
    let daemon_for_shutdown = daemon.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        info!("Received Ctrl+C signal, initiating graceful shutdown");
        daemon_for_shutdown.stop();
    });

    daemon.start().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cron_nolog() {
        let cli = Cli::try_parse_from(["scheduler", "cron", "--nolog"]).unwrap();
        assert!(matches!(cli.command, Command::Cron { nolog: true }));
        assert_eq!(cli.config, PathBuf::from("config"));
    }

    #[test]
    fn test_parse_config_dir() {
        let cli =
            Cli::try_parse_from(["scheduler", "--config", "/etc/scheduler", "unpublish"]).unwrap();
        assert!(matches!(cli.command, Command::Unpublish));
        assert_eq!(cli.config, PathBuf::from("/etc/scheduler"));
    }

    #[test]
    fn test_unknown_verb_rejected() {
        assert!(Cli::try_parse_from(["scheduler", "reschedule"]).is_err());
    }
}
