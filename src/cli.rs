use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "modpilot",
    about = "Keeps a Minecraft server's mods up to date from Modrinth and CurseForge",
    version,
    author
)]
pub struct Cli {
    /// Path to the configuration file (defaults to ./config.toml, then the user config dir)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download and install compatible updates for every configured mod
    Update,

    /// Show what an update would do without changing any file
    Check,

    /// List the mod files currently installed
    List,

    /// Full maintenance cycle: warn, stop, back up, update, restart
    Maintenance {
        /// Skip the countdown warnings before stopping the server
        #[arg(long)]
        skip_warnings: bool,
    },

    /// Check directories, server jar, sources and notification settings
    Health,

    /// Control the Minecraft server
    Server {
        #[command(subcommand)]
        action: ServerAction,
    },

    /// Create or list whole-server backups
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Write a configuration file with default settings
    InitConfig {
        /// Where to write the file
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ServerAction {
    /// Start the server in its screen session
    Start,

    /// Stop the server gracefully
    Stop,

    /// Warn players, stop and start the server again
    Restart {
        /// Skip the countdown warnings before stopping the server
        #[arg(long)]
        skip_warnings: bool,
    },

    /// Show whether the server is running
    Status,
}

#[derive(Subcommand, Debug)]
pub enum BackupAction {
    /// Archive the server directory and prune old archives
    Create,

    /// List existing archives, newest first
    List,
}
