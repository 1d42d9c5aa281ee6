//! MVR Audio CLI
//!
//! Command-line interface for the MVR audio player.

use clap::Parser;
use env_logger::Env;
use log::info;

use mvr_audio::cli::commands;
use mvr_audio::cli::{Cli, Commands, PrefsCommand};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    env_logger::Builder::from_env(Env::default().default_filter_or(cli.log_filter())).init();

    info!("MVR Audio v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd),
        None => {
            println!("MVR Audio v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Simulate {
            script,
            playlist,
            config,
            prefs_dir,
            session,
        } => commands::simulate(
            &script,
            playlist.as_deref(),
            config.as_deref(),
            prefs_dir.as_deref(),
            session.as_deref(),
        ),
        Commands::Playlist { playlist } => commands::show_playlist(playlist.as_deref()),
        Commands::Prefs { command } => match command {
            PrefsCommand::Show { dir } => commands::prefs_show(&dir),
            PrefsCommand::Reset { dir } => commands::prefs_reset(&dir),
            PrefsCommand::Prune { dir, max_age_hours } => {
                commands::prefs_prune(&dir, max_age_hours)
            }
        },
        Commands::Config { config } => commands::show_config(config.as_deref()),
    }
}
