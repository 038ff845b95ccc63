//! OGforge Updater CLI Module
//! Command-line interface for driving the updater outside the desktop shell

pub mod formatter;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ogforge-update")]
#[command(author = "OGforge Team")]
#[command(version)]
#[command(about = "Check, download and install OGforge updates", long_about = None)]
pub struct Cli {
    /// Config file (defaults to updater.config.json in the current directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (json for scripting)
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Treat this as a development build; every update command is refused
    #[arg(long, global = true)]
    pub dev: bool,

    /// Version to report as installed
    #[arg(long, global = true, default_value = env!("CARGO_PKG_VERSION"))]
    pub current_version: String,

    /// Never prompt; report needs_install instead of offering to move the app
    #[arg(long, global = true)]
    pub no_prompt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check the manifest sources for a newer version
    Check,

    /// Check, then download the update for this platform
    Download,

    /// Check, download and install, then hand off to the new version
    Install,

    /// Open a download page in the browser
    Open {
        /// http(s) URL to open
        url: String,
    },

    /// Print the effective configuration
    Config,
}

impl Cli {
    pub fn get_config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(|| {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(crate::engine::config::CONFIG_FILE_NAME)
        })
    }

    pub fn json_output(&self) -> bool {
        self.format == OutputFormat::Json
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::try_parse_from([
            "ogforge-update",
            "check",
            "--format",
            "json",
            "--dev",
            "--current-version",
            "0.9.0",
        ])
        .unwrap();

        assert!(matches!(cli.command, Commands::Check));
        assert!(cli.json_output());
        assert!(cli.dev);
        assert!(!cli.no_prompt);
        assert_eq!(cli.current_version, "0.9.0");
    }

    #[test]
    fn test_open_requires_url() {
        assert!(Cli::try_parse_from(["ogforge-update", "open"]).is_err());
        let cli = Cli::try_parse_from(["ogforge-update", "open", "https://ogforge.test"]).unwrap();
        match cli.command {
            Commands::Open { url } => assert_eq!(url, "https://ogforge.test"),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_default_config_path() {
        let cli = Cli::try_parse_from(["ogforge-update", "config"]).unwrap();
        assert!(cli.get_config_path().ends_with("updater.config.json"));
    }
}
