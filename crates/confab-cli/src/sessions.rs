//! `confab sessions` — list and remove stored conversations.
//!
//! - `confab sessions list` — sessions, newest first
//! - `confab sessions rm <ID>` — delete a session file

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use confab_core::session::SessionManager;

/// Sessions subcommands.
#[derive(Subcommand)]
pub enum SessionsCommands {
    /// List stored sessions
    List,

    /// Remove a session by ID
    Rm {
        /// Session ID
        id: String,
    },
}

/// Dispatch a sessions subcommand.
pub fn dispatch(action: SessionsCommands) -> Result<()> {
    let manager = SessionManager::new(None).context("failed to open session store")?;
    match action {
        SessionsCommands::List => list(&manager),
        SessionsCommands::Rm { id } => remove(&manager, &id),
    }
}

fn list(manager: &SessionManager) -> Result<()> {
    let sessions = manager.list_sessions();

    println!();
    if sessions.is_empty() {
        println!("  {}", "No sessions yet.".dimmed());
        println!();
        return Ok(());
    }

    println!("  {:<24} {:<36} {}", "ID".bold(), "MODEL".bold(), "UPDATED".bold());
    for s in &sessions {
        println!(
            "  {:<24} {:<36} {}",
            s.id,
            s.model,
            s.updated_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
        );
    }
    println!();
    Ok(())
}

fn remove(manager: &SessionManager, id: &str) -> Result<()> {
    if manager.delete(id) {
        println!("  {} removed session {id}", "✓".green());
        Ok(())
    } else {
        anyhow::bail!("session '{id}' not found")
    }
}
