//! OGforge Updater CLI - Main entry point for the `ogforge-update` binary
//!
//! Runs the update flow from a terminal: useful for support, scripted
//! installs and exercising the update servers without the desktop shell.

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use ogforge_updater::engine::{
    cli::{formatter::CliFormatter, Cli, Commands},
    config::UpdaterConfig,
    updater::{CommandOptions, CommandOutcome, Host, StatusSink, UpdateController, UpdateStatus},
};
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Terminal standing in for the desktop app
struct CliHost {
    version: String,
    packaged: bool,
    interactive: bool,
}

#[async_trait]
impl Host for CliHost {
    fn version(&self) -> String {
        self.version.clone()
    }

    fn is_packaged(&self) -> bool {
        self.packaged
    }

    async fn confirm_relocation(&self) -> bool {
        if !self.interactive {
            return false;
        }
        tokio::task::spawn_blocking(|| {
            print!("OGforge must be in the Applications folder to update itself. Move it now? [Y/n] ");
            std::io::stdout().flush().ok();
            let mut answer = String::new();
            if std::io::stdin().lock().read_line(&mut answer).is_err() {
                return false;
            }
            matches!(answer.trim().to_lowercase().as_str(), "" | "y" | "yes")
        })
        .await
        .unwrap_or(false)
    }

    fn prepare_exit(&self) {
        std::io::stdout().flush().ok();
    }
}

/// Prints statuses as they are emitted
struct ConsoleSink {
    json: bool,
}

impl StatusSink for ConsoleSink {
    fn deliver(&self, status: &UpdateStatus) {
        if self.json {
            // Progress is only interesting to the interactive view
            if !matches!(status, UpdateStatus::Downloading { .. }) {
                if let Ok(line) = serde_json::to_string(status) {
                    println!("{}", line);
                }
            }
        } else {
            CliFormatter::status(status);
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ogforge_updater=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.json_output();

    match run_cli(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            if json {
                println!("{}", serde_json::json!({ "ok": false, "error": format!("{:#}", e) }));
            } else {
                CliFormatter::error(&format!("{:#}", e));
            }
            std::process::exit(1);
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<UpdaterConfig> {
    let config = match &cli.config {
        Some(path) => UpdaterConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            let dir = std::env::current_dir().context("resolving current directory")?;
            UpdaterConfig::load_from_dir(&dir)?
        }
    };
    Ok(config.with_env_overrides())
}

/// Returns whether the command succeeded
async fn run_cli(cli: Cli) -> anyhow::Result<bool> {
    let json = cli.json_output();
    let mut config = load_config(&cli)?;

    if let Commands::Config = cli.command {
        cmd_config(&cli, &config, json)?;
        return Ok(true);
    }

    // The CLI installs only when asked to
    config.auto_install = false;

    let host = Arc::new(CliHost {
        version: cli.current_version.clone(),
        packaged: !cli.dev,
        interactive: !cli.no_prompt,
    });
    let controller = UpdateController::builder(host).config(config).build();
    controller.set_window(Some(Arc::new(ConsoleSink { json })));

    let options = if cli.no_prompt {
        CommandOptions::silent()
    } else {
        CommandOptions::default()
    };

    let outcome = match &cli.command {
        Commands::Open { url } => {
            let opened = controller.open_download(url);
            report("open", opened, None, json);
            return Ok(opened);
        }
        Commands::Check => controller.enable().await,
        Commands::Download => {
            let outcome = controller.enable().await;
            if outcome == CommandOutcome::Ok && update_pending(&controller) {
                controller.download(options).await
            } else {
                outcome
            }
        }
        Commands::Install => {
            let mut outcome = controller.enable().await;
            if outcome == CommandOutcome::Ok && update_pending(&controller) {
                outcome = controller.download(options).await;
                if outcome == CommandOutcome::Ok {
                    outcome = controller.install(options).await;
                }
            }
            outcome
        }
        Commands::Config => return Ok(true),
    };

    // enable() reports its check through the status stream only
    let ok = outcome.is_ok() && !matches!(controller.current_status(), Some(UpdateStatus::Error { .. }));
    let reason = outcome.reason().map(|r| r.to_string());
    report(command_name(&cli.command), ok, reason.as_deref(), json);

    controller.shutdown();
    Ok(ok)
}

fn update_pending(controller: &UpdateController) -> bool {
    matches!(controller.current_status(), Some(UpdateStatus::Available { .. }))
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Check => "check",
        Commands::Download => "download",
        Commands::Install => "install",
        Commands::Open { .. } => "open",
        Commands::Config => "config",
    }
}

fn report(command: &str, ok: bool, reason: Option<&str>, json: bool) {
    if json {
        let mut value = serde_json::json!({ "command": command, "ok": ok });
        if let Some(reason) = reason {
            value["reason"] = serde_json::Value::String(reason.to_string());
        }
        println!("{}", value);
        return;
    }

    match (ok, reason) {
        (true, _) => {}
        (false, Some("not_packaged")) => {
            CliFormatter::warning("Updates are disabled for development builds (--dev)")
        }
        (false, Some(reason)) => CliFormatter::error(&format!("{} failed: {}", command, reason)),
        (false, None) => CliFormatter::error(&format!("{} failed", command)),
    }
}

fn cmd_config(cli: &Cli, config: &UpdaterConfig, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    CliFormatter::header("Updater configuration");
    CliFormatter::kv("Config file", &cli.get_config_path().display().to_string());
    CliFormatter::kv("App", &config.app_name);
    CliFormatter::kv("Timeout", &format!("{} ms", config.timeout_ms));
    CliFormatter::kv("Download dir", &config.download_dir().display().to_string());
    CliFormatter::kv(
        "Auto install",
        &format!("{} (after {} ms)", config.auto_install, config.auto_install_delay_ms),
    );
    CliFormatter::header("Manifest sources");
    for url in &config.manifest_urls {
        CliFormatter::item(url);
    }
    Ok(())
}
