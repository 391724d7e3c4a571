//! Shared CLI helpers — path expansion, reply printing, version banner.

use std::path::PathBuf;

use colored::Colorize;

use confab_core::config::ToolServerConfig;
use confab_core::types::Message;

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_next::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs_next::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Tool server configs with `~` expanded in their command paths.
pub fn resolve_tool_servers(servers: &[ToolServerConfig]) -> Vec<ToolServerConfig> {
    servers
        .iter()
        .map(|server| ToolServerConfig {
            command: expand_tilde(&server.command).to_string_lossy().into_owned(),
            ..server.clone()
        })
        .collect()
}

/// Print a model reply to stdout. Reasoning, when present, is shown dimmed
/// above the visible text.
pub fn print_reply(reply: &Message) {
    println!();
    let label = reply.model.as_deref().unwrap_or("confab");
    println!("{}", label.cyan().bold());
    if let Some(thought) = &reply.thought {
        println!("{}", thought.trim().dimmed().italic());
        println!();
    }
    if reply.content.is_empty() {
        println!("{}", "(no response)".dimmed());
    } else {
        println!("{}", reply.content);
    }
    println!();
}

/// Print the banner shown at REPL start.
pub fn print_banner(session_id: &str, model: &str) {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "Confab".cyan().bold(), version.dimmed());
    println!(
        "{}",
        format!("session {session_id} · model {model}").dimmed()
    );
    println!("{}", "Type a message, or \"exit\" to quit.".dimmed());
    println!();
}

/// Print a "thinking" placeholder (for non-log mode).
pub fn print_thinking() {
    eprint!("{}", "⠿ thinking...".dimmed());
}

/// Clear the "thinking" placeholder.
pub fn clear_thinking() {
    eprint!("\r{}\r", " ".repeat(40));
}

/// A check mark or a dimmed dot.
pub fn mark(ok: bool) -> String {
    if ok {
        "✓".green().to_string()
    } else {
        "·".dimmed().to_string()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_tilde_home() {
        let result = expand_tilde("~/foo/bar");
        assert!(result.ends_with("foo/bar"));
        assert!(!result.starts_with("~"));
    }

    #[test]
    fn expand_tilde_no_tilde() {
        let result = expand_tilde("/absolute/path");
        assert_eq!(result, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn tool_server_commands_expanded() {
        let servers = vec![ToolServerConfig {
            name: "weather".into(),
            command: "/usr/local/bin/weather-tools".into(),
            args: vec!["--verbose".into()],
            timeout_secs: 10,
        }];
        let resolved = resolve_tool_servers(&servers);
        assert_eq!(resolved, servers);

        let home = ToolServerConfig {
            command: "~/bin/tools".into(),
            ..ToolServerConfig::default()
        };
        let resolved = resolve_tool_servers(&[home]);
        assert!(!resolved[0].command.starts_with('~'));
        assert!(resolved[0].command.ends_with("bin/tools"));
        assert_eq!(resolved[0].timeout_secs, 30);
    }
}
