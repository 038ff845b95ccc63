//! CLI Output Formatting Module
//! Provides consistent, colorized output for terminal UX

use colored::Colorize;
use std::io::Write;

use crate::engine::updater::{UpdateInfo, UpdateStatus};

pub struct CliFormatter;

impl CliFormatter {
    /// Print a success message
    pub fn success(message: &str) {
        println!("{} {}", "✓".green().bold(), message);
    }

    /// Print an error message
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message);
    }

    /// Print a warning message
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow().bold(), message);
    }

    /// Print an info message
    pub fn info(message: &str) {
        println!("{} {}", "ℹ".blue().bold(), message);
    }

    /// Print a section header
    pub fn header(title: &str) {
        println!("\n{}", title.bright_cyan().bold());
        println!("{}", "─".repeat(title.chars().count()).bright_black());
    }

    /// Print a key-value pair
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", key.bright_white().bold(), value);
    }

    /// Print a list item
    pub fn item(text: &str) {
        println!("  {} {}", "•".bright_black(), text);
    }

    /// Redraw the download progress bar in place
    pub fn progress(percent: f64, transferred: u64, total: u64) {
        print!("\r  [");
        let filled = (percent / 5.0).floor() as usize;
        for i in 0..20 {
            if i < filled {
                print!("{}", "█".bright_green());
            } else {
                print!("{}", "░".bright_black());
            }
        }
        print!("] {:>3.0}% {}", percent, progress_label(transferred, total));
        if percent >= 100.0 {
            println!();
        }
        std::io::stdout().flush().ok();
    }

    fn update_info(info: &UpdateInfo) {
        Self::kv("Installed", &info.current_version);
        Self::kv("Latest", &info.latest_version);
        if let Some(url) = &info.download_url {
            Self::kv("Download", url);
        }
        if let Some(notes) = &info.notes {
            Self::kv("Notes", notes);
        }
        if info.required {
            Self::warning("This update is required");
        }
    }

    /// Print one status event
    pub fn status(status: &UpdateStatus) {
        match status {
            UpdateStatus::Checking => Self::info("Checking for updates..."),
            UpdateStatus::Available { info } => {
                Self::header("Update available");
                Self::update_info(info);
            }
            UpdateStatus::UpToDate { info } => {
                Self::success(&format!("OGforge {} is up to date", info.current_version));
            }
            UpdateStatus::Downloading {
                percent,
                transferred,
                total,
            } => Self::progress(*percent, *transferred, *total),
            UpdateStatus::Downloaded { info, file } => {
                Self::success(&format!("Downloaded {}", info.latest_version));
                Self::item(&file.display().to_string());
            }
            UpdateStatus::Error { message } => Self::error(message),
            UpdateStatus::NeedsInstall { message } => Self::warning(message),
            UpdateStatus::Relaunch { message } => Self::info(message),
        }
    }
}

fn progress_label(transferred: u64, total: u64) -> String {
    if total > 0 {
        format!("{} / {}", format_size(transferred), format_size(total))
    } else {
        format_size(transferred)
    }
}

/// Format file size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}
