use std::path::PathBuf;

use clap::{Parser, Subcommand};

use ollama_installer::install::LATEST;

#[derive(Parser, Debug)]
#[command(version, about = "Ollama install and lifecycle manager")]
pub struct Args {
    /// Path to configuration file (default: installer.toml next to the install state)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub sub: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Install ollama unless it is already installed or running
    Install {
        /// Release to download
        #[arg(long, default_value = LATEST)]
        release: String,

        /// Directory to install ollama to (an `ollama` entry is created inside)
        #[arg(long)]
        install_path: Option<PathBuf>,
    },
    /// Stop and remove the ollama installed by this tool
    Uninstall,
    /// Print the install location, or nothing if not installed
    Locate,
    /// Print installed/running status as JSON
    Check,
    /// Run ollama in a new process and wait until it answers
    Start {
        /// Model to pull once started; empty skips the pull
        #[arg(long)]
        model: Option<String>,

        /// Seconds to wait for the server before giving up (default: forever)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Stop every running instance of the installed ollama
    Shutdown,
}
