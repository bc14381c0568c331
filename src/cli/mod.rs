pub mod history;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use history::process_history_command;
use tracing::level_filters::LevelFilter;

use crate::{
    tracker::{config::TrackerConfig, start_tracker},
    utils::{
        dir::{create_application_default_path, ensure_dir},
        logging::{enable_logging, CLI_PREFIX, TRACK_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Daytally", version, long_about = None)]
#[command(about = "Tracks time spent on a single activity per day", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Start a tracking session in the current console")]
    Track {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
        #[command(flatten)]
        config: TrackerConfig,
        /// This option is for debugging purposes only. Logs are written over the timer.
        #[arg(long = "log-console")]
        log_console: bool,
        #[arg(long = "log-filter")]
        log_filter: Option<LevelFilter>,
    },
    #[command(about = "Display time spent during the last days")]
    History {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
        #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u32).range(1..))]
        days: u32,
    },
}

fn application_path(dir: Option<PathBuf>) -> Result<PathBuf> {
    match dir {
        Some(dir) => ensure_dir(dir),
        None => create_application_default_path(),
    }
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    match args.commands {
        Commands::Track {
            dir,
            config,
            log_console,
            log_filter,
        } => {
            let dir = application_path(dir)?;
            enable_logging(TRACK_PREFIX, &dir, log_filter, log_console)?;
            eprintln!("Press enter to start or stop tracking, p to pause, q to quit.");
            start_tracker(dir, config).await
        }
        Commands::History { dir, days } => {
            let dir = application_path(dir)?;
            enable_logging(CLI_PREFIX, &dir, None, false)?;
            process_history_command(dir, days).await
        }
    }
}
