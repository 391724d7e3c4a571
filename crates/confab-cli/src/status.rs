//! `confab status` — configuration summary and per-engine connectivity.

use anyhow::Result;
use colored::Colorize;

use confab_core::config::{get_config_path, load_config};
use confab_providers::{EngineRegistry, ProviderKind};

use crate::helpers::mark;

/// Run the status command.
pub async fn run() -> Result<()> {
    let config = load_config(None);
    let config_path = get_config_path();

    println!();
    println!("{}", "Confab Status".cyan().bold());
    println!();

    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        config_path.display(),
        if config_path.exists() {
            "✓".green().to_string()
        } else {
            "(not found, using defaults)".red().to_string()
        }
    );

    let defaults = &config.defaults;
    println!(
        "  {:<18} {} {}",
        "Default model:".bold(),
        defaults.model,
        format!("(engine {})", defaults.engine_id).dimmed()
    );
    println!(
        "  {:<18} {}",
        "Dispatch:".bold(),
        format!(
            "max {} rounds · {:?}",
            config.dispatch.max_rounds, config.dispatch.tool_call_policy
        )
        .dimmed()
    );

    // Engines
    println!();
    println!("  {}", "Engines:".bold());
    if config.engines.is_empty() {
        println!("    {}", "· none configured".dimmed());
    }

    let registry = EngineRegistry::from_config(&config);
    for engine in registry.engines() {
        let Some(kind) = ProviderKind::parse(&engine.kind) else {
            println!(
                "    {:<20} {}",
                engine.id,
                format!("unknown provider kind '{}'", engine.kind).red()
            );
            continue;
        };
        let spec = kind.spec();

        let key = if spec.requires_api_key {
            format!("{} key", mark(engine.options.has_api_key()))
        } else {
            "no key needed".dimmed().to_string()
        };

        let connected = match registry.adapter(&engine.id) {
            Some(adapter) => adapter.connected().await,
            None => false,
        };
        let reach = if connected {
            "connected".green().to_string()
        } else {
            "unreachable".red().to_string()
        };

        println!(
            "    {:<20} {:<12} {}  {}",
            engine.id,
            spec.display_name,
            key,
            reach
        );
    }

    // Tool servers
    println!();
    println!("  {}", "Tool servers:".bold());
    if config.tool_servers.is_empty() {
        println!("    {}", "· none configured".dimmed());
    }
    for server in &config.tool_servers {
        let enabled = defaults.enabled_tool_servers.contains(&server.name);
        println!(
            "    {:<20} {} {}",
            server.name,
            mark(enabled),
            format!("{} {}", server.command, server.args.join(" ")).dimmed()
        );
    }

    println!();
    Ok(())
}
