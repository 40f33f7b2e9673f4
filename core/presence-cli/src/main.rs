//! media-presence: shows what the local media player is doing as rich
//! presence in the desktop chat client.
//!
//! ## Subcommands
//!
//! - `run`: Keep a presence session alive until SIGINT/SIGTERM
//! - `clear`: Connect once and clear any presence we left behind
//! - `endpoints`: List IPC endpoints in discovery order
//! - `config`: Print the resolved settings as JSON

mod commands;
mod logging;
mod now_playing;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "media-presence")]
#[command(about = "Media player rich presence for Discord")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the presence session until interrupted
    Run {
        /// Settings file (defaults to the platform config directory)
        #[arg(long, value_name = "PATH")]
        settings: Option<PathBuf>,

        /// JSON "now playing" file maintained by the media player
        #[arg(long, value_name = "PATH")]
        metadata_file: Option<PathBuf>,

        /// Application id override (17-20 digits)
        #[arg(long, value_name = "ID")]
        client_id: Option<String>,
    },

    /// Clear the current presence and disconnect
    Clear {
        /// Application id override (17-20 digits)
        #[arg(long, value_name = "ID")]
        client_id: Option<String>,
    },

    /// List candidate IPC endpoints and whether each exists
    Endpoints,

    /// Print the resolved settings
    Config {
        /// Settings file (defaults to the platform config directory)
        #[arg(long, value_name = "PATH")]
        settings: Option<PathBuf>,
    },
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            settings,
            metadata_file,
            client_id,
        } => commands::run(settings, metadata_file, client_id),
        Commands::Clear { client_id } => commands::clear(client_id),
        Commands::Endpoints => {
            commands::endpoints();
            Ok(())
        }
        Commands::Config { settings } => commands::config(settings),
    };

    if let Err(err) = result {
        tracing::error!(error = %err, "media-presence failed");
        std::process::exit(1);
    }
}
