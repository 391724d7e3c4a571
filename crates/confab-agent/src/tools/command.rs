//! Command tool server — tools served by external programs.
//!
//! Each configured server is a command line. Confab appends a verb:
//!
//! - `<command> <args…> list` prints a JSON array of tool definitions.
//! - `<command> <args…> call <tool>` reads the JSON arguments on stdin and
//!   prints the tool's answer.
//!
//! Only servers named in the session's `enabledToolServers` are consulted.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use confab_core::config::ToolServerConfig;
use confab_core::types::{Arguments, Session, Tool};

use super::base::ToolServer;

/// Maximum answer length before truncation (characters).
const MAX_OUTPUT_LEN: usize = 10_000;

/// Tool server backed by external commands.
pub struct CommandToolServer {
    servers: Vec<ToolServerConfig>,
    /// tool name → server name, refreshed on every listing.
    routes: Mutex<HashMap<String, String>>,
}

impl CommandToolServer {
    pub fn new(servers: Vec<ToolServerConfig>) -> Self {
        Self {
            servers,
            routes: Mutex::new(HashMap::new()),
        }
    }

    /// Configured servers enabled for this session, in configuration order.
    fn enabled<'a>(&'a self, session: &'a Session) -> impl Iterator<Item = &'a ToolServerConfig> + 'a {
        self.servers
            .iter()
            .filter(move |s| is_enabled(session, &s.name))
    }

    fn route(&self, tool: &str) -> Option<String> {
        let routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        routes.get(tool).cloned()
    }

    async fn list_server(&self, server: &ToolServerConfig) -> anyhow::Result<Vec<Tool>> {
        let stdout = run(server, &["list"], None).await?;
        serde_json::from_str(&stdout)
            .with_context(|| format!("tool server '{}' printed an invalid tool list", server.name))
    }

    /// Resolve which enabled server owns `tool`, re-listing on a cache miss.
    async fn server_for(&self, session: &Session, tool: &str) -> anyhow::Result<&ToolServerConfig> {
        let name = match self.route(tool) {
            Some(name) => Some(name),
            None => {
                self.list_tools(session).await?;
                self.route(tool)
            }
        };

        name.filter(|name| is_enabled(session, name))
            .and_then(|name| self.servers.iter().find(|s| s.name == name))
            .ok_or_else(|| anyhow!("Tool '{tool}' not found"))
    }
}

#[async_trait]
impl ToolServer for CommandToolServer {
    async fn list_tools(&self, session: &Session) -> anyhow::Result<Vec<Tool>> {
        let mut tools = Vec::new();
        let mut found = HashMap::new();

        for server in self.enabled(session) {
            match self.list_server(server).await {
                Ok(listed) => {
                    debug!(server = %server.name, count = listed.len(), "listed tools");
                    for tool in listed {
                        found
                            .entry(tool.name.clone())
                            .or_insert_with(|| server.name.clone());
                        tools.push(tool);
                    }
                }
                Err(e) => {
                    warn!(server = %server.name, error = %e, "tool server listing failed, skipping");
                }
            }
        }

        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        routes.extend(found);
        Ok(tools)
    }

    async fn execute_tool(
        &self,
        session: &Session,
        name: &str,
        arguments: &Arguments,
    ) -> anyhow::Result<String> {
        let server = self.server_for(session, name).await?;
        let input = serde_json::to_string(arguments)?;

        info!(server = %server.name, tool = name, "calling external tool");
        run(server, &["call", name], Some(input)).await
    }
}

fn is_enabled(session: &Session, server: &str) -> bool {
    session
        .config
        .enabled_tool_servers
        .iter()
        .any(|name| name == server)
}

/// Run one server invocation and return its stdout.
async fn run(server: &ToolServerConfig, verb: &[&str], stdin: Option<String>) -> anyhow::Result<String> {
    let timeout = Duration::from_secs(server.timeout_secs);

    let mut child = Command::new(&server.command)
        .args(&server.args)
        .args(verb)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn tool server '{}'", server.name))?;

    let pipe = child.stdin.take();
    let feed = async move {
        if let (Some(input), Some(mut pipe)) = (stdin, pipe) {
            // A server may exit without reading its input; its exit status decides.
            if let Err(e) = pipe.write_all(input.as_bytes()).await {
                debug!(server = %server.name, error = %e, "tool server closed stdin early");
            }
            // Dropping the pipe closes it so the server sees EOF.
        }
    };
    // Feed stdin while draining stdout; a server that never reads must still hit the timeout.
    let exchange = async {
        let ((), output) = tokio::join!(feed, child.wait_with_output());
        output
    };

    let output = match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => result?,
        Err(_) => bail!(
            "tool server '{}' timed out after {}s",
            server.name,
            server.timeout_secs
        ),
    };

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "tool server '{}' exited with code {code}: {}",
            server.name,
            stderr.trim()
        );
    }

    let mut stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
    if stdout.len() > MAX_OUTPUT_LEN {
        let mut cut = MAX_OUTPUT_LEN;
        while !stdout.is_char_boundary(cut) {
            cut -= 1;
        }
        stdout.truncate(cut);
        stdout.push_str("\n... (truncated)");
    }
    Ok(stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use confab_core::types::SessionConfig;
    use serde_json::json;
    use std::path::Path;

    const WEATHER_SERVER: &str = r#"
case "$1" in
  list)
    echo '[{"name":"get_weather","description":"Current weather","parameters":{"type":"object","required":["location"],"properties":{"location":{"type":"string"}}}}]'
    ;;
  call)
    input=$(cat)
    echo "tool=$2 args=$input"
    ;;
esac
"#;

    fn write_script(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path.to_string_lossy().to_string()
    }

    fn server(name: &str, script: String, timeout_secs: u64) -> ToolServerConfig {
        ToolServerConfig {
            name: name.into(),
            command: "sh".into(),
            args: vec![script],
            timeout_secs,
        }
    }

    fn session(enabled: &[&str]) -> Session {
        Session::new(
            "s1",
            SessionConfig {
                enabled_tool_servers: enabled.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_list_enabled_server() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "weather.sh", WEATHER_SERVER);
        let tools = CommandToolServer::new(vec![server("weather", script, 5)]);

        let listed = tools.list_tools(&session(&["weather"])).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "get_weather");
        assert_eq!(listed[0].parameters.required, vec!["location".to_string()]);
    }

    #[tokio::test]
    async fn test_disabled_server_not_consulted() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "weather.sh", WEATHER_SERVER);
        let tools = CommandToolServer::new(vec![server("weather", script, 5)]);

        let s = session(&[]);
        assert!(tools.list_tools(&s).await.unwrap().is_empty());

        let err = tools
            .execute_tool(&s, "get_weather", &Arguments::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_call_passes_arguments_on_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "weather.sh", WEATHER_SERVER);
        let tools = CommandToolServer::new(vec![server("weather", script, 5)]);

        let mut args = Arguments::new();
        args.insert("location".into(), json!("NYC"));

        // No prior listing: the route is resolved on demand.
        let out = tools
            .execute_tool(&session(&["weather"]), "get_weather", &args)
            .await
            .unwrap();
        assert_eq!(out, r#"tool=get_weather args={"location":"NYC"}"#);
    }

    #[tokio::test]
    async fn test_broken_server_skipped_in_listing() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_script(dir.path(), "weather.sh", WEATHER_SERVER);
        let bad = write_script(dir.path(), "bad.sh", "echo 'not json'\n");
        let tools = CommandToolServer::new(vec![
            server("bad", bad, 5),
            server("weather", good, 5),
        ]);

        let listed = tools.list_tools(&session(&["bad", "weather"])).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "get_weather");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "flaky.sh",
            r#"
case "$1" in
  list) echo '[{"name":"flaky"}]' ;;
  call) echo "upstream unavailable" >&2; exit 3 ;;
esac
"#,
        );
        let tools = CommandToolServer::new(vec![server("flaky", script, 5)]);

        let err = tools
            .execute_tool(&session(&["flaky"]), "flaky", &Arguments::new())
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("exited with code 3"));
        assert!(err.contains("upstream unavailable"));
    }

    #[tokio::test]
    async fn test_timeout_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "slow.sh",
            r#"
case "$1" in
  list) echo '[{"name":"slow"}]' ;;
  call) sleep 5 ;;
esac
"#,
        );
        let tools = CommandToolServer::new(vec![server("slow", script, 1)]);

        let err = tools
            .execute_tool(&session(&["slow"]), "slow", &Arguments::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_timeout_covers_unread_large_input() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "deaf.sh",
            r#"
case "$1" in
  list) echo '[{"name":"deaf"}]' ;;
  call) sleep 30 ;;
esac
"#,
        );
        let tools = CommandToolServer::new(vec![server("deaf", script, 1)]);

        // Far larger than a pipe buffer, and the server never reads it.
        let mut args = Arguments::new();
        args.insert("blob".into(), json!("x".repeat(1024 * 1024)));

        let result = tokio::time::timeout(
            Duration::from_secs(8),
            tools.execute_tool(&session(&["deaf"]), "deaf", &args),
        )
        .await
        .expect("call should give up at the server timeout");
        assert!(result.unwrap_err().to_string().contains("timed out"));
    }
}
