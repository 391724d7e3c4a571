//! `confab init` — write `~/.confab/config.json` with defaults.
//!
//! The default config has one local Ollama engine; other providers are
//! added by editing the file.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use confab_core::config::{get_config_path, save_config, Config};
use confab_core::utils::{get_data_path, get_sessions_path};

/// Run the init command.
pub fn run() -> Result<()> {
    println!();
    println!("{}", "Confab — Setup".cyan().bold());
    println!();

    let config_path = get_config_path();
    if config_path.exists() {
        println!(
            "  {} config already exists at {}",
            "✓".green(),
            config_path.display()
        );
    } else {
        write_default_config(&config_path)?;
        println!(
            "  {} created config at {}",
            "✓".green(),
            config_path.display()
        );
    }

    let sessions_dir = get_sessions_path();
    std::fs::create_dir_all(&sessions_dir)
        .with_context(|| format!("failed to create {}", sessions_dir.display()))?;
    std::fs::create_dir_all(get_data_path().join("history"))?;
    println!("  {} sessions at {}", "✓".green(), sessions_dir.display());

    println!();
    println!(
        "{}",
        "Add engines to the config, then run `confab status`.".dimmed()
    );
    println!();
    Ok(())
}

fn write_default_config(path: &Path) -> Result<()> {
    save_config(&Config::default(), Some(path))
        .with_context(|| format!("failed to write {}", path.display()))
}
