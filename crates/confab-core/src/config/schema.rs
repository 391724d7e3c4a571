//! Configuration schema.
//!
//! Hierarchy: `Config` → `EngineConfig`, `ModelFilter`, `SessionDefaults`,
//! `DispatchSettings`, `ToolServerConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! We use `#[serde(rename_all = "camelCase")]` to handle the conversion.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{EngineOptions, SessionConfig};

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.confab/config.json` + env vars.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub engines: Vec<EngineConfig>,
    /// Per-provider-kind model allow-lists. Kinds without an entry allow all.
    pub model_filters: BTreeMap<String, ModelFilter>,
    pub defaults: SessionDefaults,
    pub dispatch: DispatchSettings,
    pub tool_servers: Vec<ToolServerConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let mut model_filters = BTreeMap::new();
        model_filters.insert(
            "openai".to_string(),
            ModelFilter::Only(
                DEFAULT_OPENAI_MODELS
                    .iter()
                    .map(|m| m.to_string())
                    .collect(),
            ),
        );

        Self {
            engines: vec![EngineConfig {
                id: "ollama".to_string(),
                name: "Ollama".to_string(),
                kind: "ollama".to_string(),
                options: EngineOptions {
                    api_key: String::new(),
                    url: Some("http://localhost:11434".to_string()),
                },
            }],
            model_filters,
            defaults: SessionDefaults::default(),
            dispatch: DispatchSettings::default(),
            tool_servers: Vec::new(),
        }
    }
}

/// Chat models kept from OpenAI's listing (which also returns embeddings,
/// audio, and moderation models).
const DEFAULT_OPENAI_MODELS: &[&str] = &[
    "gpt-4o",
    "gpt-4o-mini",
    "gpt-4.1",
    "gpt-4.1-mini",
    "gpt-4.1-nano",
    "o3-mini",
    "o4-mini",
];

impl Config {
    /// The model filter for a provider kind (`All` when none is configured).
    pub fn model_filter(&self, kind: &str) -> ModelFilter {
        self.model_filters
            .get(kind)
            .cloned()
            .unwrap_or(ModelFilter::All)
    }

    /// Find an engine by id.
    pub fn engine(&self, id: &str) -> Option<&EngineConfig> {
        self.engines.iter().find(|e| e.id == id)
    }

    /// Find a tool server by name.
    pub fn tool_server(&self, name: &str) -> Option<&ToolServerConfig> {
        self.tool_servers.iter().find(|s| s.name == name)
    }
}

// ─────────────────────────────────────────────
// Engines
// ─────────────────────────────────────────────

/// A persisted engine record: which provider, with which credential and endpoint.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub id: String,
    pub name: String,
    /// Provider kind tag (`"openai"`, `"anthropic"`, `"gemini"`, `"ollama"`).
    pub kind: String,
    pub options: EngineOptions,
}

// ─────────────────────────────────────────────
// Model filters
// ─────────────────────────────────────────────

/// Allow-list applied to a provider's model listing.
///
/// On disk: the string `"all"` or an array of model names.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawModelFilter", into = "RawModelFilter")]
pub enum ModelFilter {
    All,
    Only(Vec<String>),
}

impl ModelFilter {
    /// Whether a model name passes the filter.
    pub fn allows(&self, name: &str) -> bool {
        match self {
            ModelFilter::All => true,
            ModelFilter::Only(names) => names.iter().any(|n| n == name),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawModelFilter {
    Keyword(String),
    Names(Vec<String>),
}

impl TryFrom<RawModelFilter> for ModelFilter {
    type Error = String;

    fn try_from(raw: RawModelFilter) -> Result<Self, Self::Error> {
        match raw {
            RawModelFilter::Keyword(k) if k.eq_ignore_ascii_case("all") => Ok(ModelFilter::All),
            RawModelFilter::Keyword(k) => Err(format!(
                "unknown model filter keyword '{k}' (expected \"all\" or a list of names)"
            )),
            RawModelFilter::Names(names) => Ok(ModelFilter::Only(names)),
        }
    }
}

impl From<ModelFilter> for RawModelFilter {
    fn from(filter: ModelFilter) -> Self {
        match filter {
            ModelFilter::All => RawModelFilter::Keyword("all".to_string()),
            ModelFilter::Only(names) => RawModelFilter::Names(names),
        }
    }
}

// ─────────────────────────────────────────────
// Session defaults
// ─────────────────────────────────────────────

/// Settings applied to newly created sessions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionDefaults {
    /// Canonical model id (`"openai:gpt-4o"`, or a bare Ollama model name).
    pub model: String,
    pub engine_id: String,
    pub context_window: Option<u32>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub enabled_tool_servers: Vec<String>,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            model: "llama3.1".to_string(),
            engine_id: "ollama".to_string(),
            context_window: Some(4096),
            temperature: Some(0.8),
            max_tokens: None,
            enabled_tool_servers: Vec::new(),
        }
    }
}

impl SessionDefaults {
    /// Build the config for a new session.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            model: self.model.clone(),
            engine_id: self.engine_id.clone(),
            context_window: self.context_window,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            enabled_tool_servers: self.enabled_tool_servers.clone(),
        }
    }
}

// ─────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────

/// How a reply carrying several tool calls is drained.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ToolCallPolicy {
    /// Execute the first call, then re-query the model.
    #[default]
    OnePerRound,
    /// Execute every call in the batch before re-querying.
    AllPerRound,
}

impl ToolCallPolicy {
    /// Parse a policy name, ignoring case, `_` and `-` (`allPerRound`, `all_per_round`).
    pub fn parse(name: &str) -> Option<Self> {
        let key: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "oneperround" => Some(ToolCallPolicy::OnePerRound),
            "allperround" => Some(ToolCallPolicy::AllPerRound),
            _ => None,
        }
    }
}

/// Dispatch loop limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchSettings {
    /// Maximum model rounds per dispatch before giving up.
    pub max_rounds: usize,
    pub tool_call_policy: ToolCallPolicy,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_rounds: 20,
            tool_call_policy: ToolCallPolicy::OnePerRound,
        }
    }
}

// ─────────────────────────────────────────────
// Tool servers
// ─────────────────────────────────────────────

/// An out-of-process tool server invoked as a command.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolServerConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    /// Per-invocation timeout.
    pub timeout_secs: u64,
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            command: String::new(),
            args: Vec::new(),
            timeout_secs: 30,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.engines.len(), 1);
        assert_eq!(config.engines[0].kind, "ollama");
        assert_eq!(config.dispatch.max_rounds, 20);
        assert_eq!(config.dispatch.tool_call_policy, ToolCallPolicy::OnePerRound);
        assert!(config.model_filter("openai").allows("gpt-4o"));
        assert!(!config.model_filter("openai").allows("text-embedding-3-small"));
        assert_eq!(config.model_filter("gemini"), ModelFilter::All);
    }

    #[test]
    fn test_model_filter_from_json() {
        let all: ModelFilter = serde_json::from_value(json!("all")).unwrap();
        assert_eq!(all, ModelFilter::All);

        let only: ModelFilter = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert!(only.allows("a"));
        assert!(!only.allows("c"));

        assert!(serde_json::from_value::<ModelFilter>(json!("some")).is_err());
    }

    #[test]
    fn test_model_filter_serializes_sentinel() {
        assert_eq!(serde_json::to_value(ModelFilter::All).unwrap(), json!("all"));
    }

    #[test]
    fn test_engine_config_camel_case() {
        let engine: EngineConfig = serde_json::from_value(json!({
            "id": "oai",
            "name": "OpenAI",
            "kind": "openai",
            "options": { "apiKey": "sk-123", "url": "https://proxy/v1" }
        }))
        .unwrap();

        assert_eq!(engine.options.api_key, "sk-123");
        assert_eq!(engine.options.url.as_deref(), Some("https://proxy/v1"));
    }

    #[test]
    fn test_tool_call_policy_json() {
        let settings: DispatchSettings =
            serde_json::from_value(json!({"toolCallPolicy": "allPerRound"})).unwrap();
        assert_eq!(settings.tool_call_policy, ToolCallPolicy::AllPerRound);
        assert_eq!(settings.max_rounds, 20);

        assert_eq!(ToolCallPolicy::parse("ONE_PER_ROUND"), Some(ToolCallPolicy::OnePerRound));
        assert_eq!(ToolCallPolicy::parse("all-per-round"), Some(ToolCallPolicy::AllPerRound));
        assert_eq!(ToolCallPolicy::parse("sometimes"), None);
    }

    #[test]
    fn test_session_defaults_to_session_config() {
        let defaults = SessionDefaults {
            enabled_tool_servers: vec!["fs".into()],
            ..Default::default()
        };
        let cfg = defaults.session_config();
        assert_eq!(cfg.engine_id, "ollama");
        assert_eq!(cfg.context_window, Some(4096));
        assert_eq!(cfg.enabled_tool_servers, vec!["fs".to_string()]);
    }

    #[test]
    fn test_tool_server_default_timeout() {
        let server: ToolServerConfig =
            serde_json::from_value(json!({"name": "fs", "command": "fs-tools"})).unwrap();
        assert_eq!(server.timeout_secs, 30);
        assert!(server.args.is_empty());
    }
}
