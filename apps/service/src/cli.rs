use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use uuid::Uuid;

use crate::config::{self, Config};
use crate::maintenance::MaintenanceSuppressor;
use crate::orchestrator::{Orchestrator, Stores, open_store};

#[derive(Debug, Parser)]
#[clap(version, about)]
pub struct Cli {
    /// Config file, defaults to $XDG_CONFIG_HOME/uppe/sentinel.toml
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    cmd: Option<Command>,
}

#[derive(Debug, clap::Subcommand)]
#[clap(rename_all = "kebab-case")]
pub enum Command {
    /// Run the monitoring loop, alert pipeline and maintenance scheduler (default)
    Run,
    /// Run monitors once and print their results
    Check(CheckArgs),
    /// Inspect maintenance windows
    #[clap(subcommand)]
    Maintenance(MaintenanceCommand),
    /// Print the effective configuration
    Config,
}

#[derive(Debug, clap::Args)]
pub struct CheckArgs {
    /// Monitor to run, repeatable. Every enabled monitor when omitted.
    #[clap(long = "monitor")]
    monitors: Vec<Uuid>,

    /// Don't persist results or send notifications
    #[clap(long)]
    dry_run: bool,
}

#[derive(Debug, clap::Subcommand)]
#[clap(rename_all = "kebab-case")]
pub enum MaintenanceCommand {
    /// List windows that have not ended yet
    List,
    /// Show whether a monitor is currently under maintenance
    Status {
        #[clap(long)]
        monitor: Uuid,
    },
}

impl Cli {
    pub async fn run(&self, config: Config) -> Result<()> {
        match &self.cmd {
            None | Some(Command::Run) => Orchestrator::start(config).await,
            Some(Command::Check(args)) => check(config, args).await,
            Some(Command::Maintenance(cmd)) => maintenance(config, cmd).await,
            Some(Command::Config) => {
                let path = match &self.config {
                    Some(path) => path.display().to_string(),
                    None => config::default_config_path()?.display().to_string(),
                };
                println!("Config file: {path}");
                print!("{config}");
                Ok(())
            }
        }
    }
}

async fn check(config: Config, args: &CheckArgs) -> Result<()> {
    let store = open_store(&config).await?;
    let orchestrator = Orchestrator::new(config, Stores::shared(store))?;

    let results = orchestrator.check_once(&args.monitors, args.dry_run).await?;
    if results.is_empty() {
        println!("No monitors to run");
    }
    for (monitor, result) in results {
        let latency = result.latency_ms().map(|ms| format!("{ms}ms")).unwrap_or_else(|| "-".into());
        println!(
            "{} {:<24} {:<11} {:>8}  {}",
            result.status.glyph(),
            monitor.name,
            monitor.kind.as_str(),
            latency,
            result.message
        );
    }
    Ok(())
}

async fn maintenance(config: Config, cmd: &MaintenanceCommand) -> Result<()> {
    let store = open_store(&config).await?;
    let now = Utc::now();

    match cmd {
        MaintenanceCommand::List => {
            let windows = store.upcoming_windows(now).await?;
            if windows.is_empty() {
                println!("No upcoming maintenance windows");
            }
            for window in windows {
                let state = if window.contains(now) { "active" } else { "scheduled" };
                println!(
                    "{}  {:<9} {} -> {}  {} ({} monitors)",
                    window.id,
                    state,
                    window.starts_at.to_rfc3339(),
                    window.ends_at.to_rfc3339(),
                    window.name,
                    window.monitor_ids.len()
                );
            }
        }
        MaintenanceCommand::Status { monitor } => {
            let suppressor = MaintenanceSuppressor::new(store);
            match suppressor.active_window(*monitor, Some(now)).await? {
                Some(window) => println!(
                    "{} is under maintenance '{}' until {}",
                    monitor,
                    window.name,
                    window.ends_at.to_rfc3339()
                ),
                None => println!("{monitor} is not under maintenance"),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_check_flags() {
        let id = Uuid::new_v4();
        let cli = Cli::parse_from(["uppe-sentinel", "check", "--monitor", id.to_string().as_str(), "--dry-run"]);

        match cli.cmd {
            Some(Command::Check(args)) => {
                assert_eq!(args.monitors, vec![id]);
                assert!(args.dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_run_is_default() {
        let cli = Cli::parse_from(["uppe-sentinel", "--config", "/tmp/sentinel.toml"]);
        assert!(cli.cmd.is_none());
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/sentinel.toml")));
    }

    #[test]
    fn test_maintenance_status_requires_monitor() {
        assert!(Cli::try_parse_from(["uppe-sentinel", "maintenance", "status"]).is_err());
    }
}
