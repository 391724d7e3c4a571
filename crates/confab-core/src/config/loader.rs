//! Config loader — reads `~/.confab/config.json`, merges env vars, and
//! applies legacy migrations.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.confab/config.json`
//! 3. Environment variables `CONFAB_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::{Config, ToolCallPolicy};

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    load_config_from_path(&config_path)
}

/// Load config from a specific file path.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    let mut raw: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    migrate_config(&mut raw);

    let config: Config = match serde_json::from_value(raw) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to deserialize config: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply legacy config migrations.
///
/// Moves `engines[].options.apiBase` → `engines[].options.url`.
fn migrate_config(raw: &mut serde_json::Value) {
    let Some(engines) = raw.get_mut("engines").and_then(|e| e.as_array_mut()) else {
        return;
    };

    for engine in engines {
        let Some(options) = engine.get_mut("options").and_then(|o| o.as_object_mut()) else {
            continue;
        };
        if let Some(base) = options.remove("apiBase") {
            if !options.contains_key("url") {
                options.insert("url".to_string(), base);
                debug!("Migrated engines[].options.apiBase → engines[].options.url");
            }
        }
    }
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `CONFAB_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `CONFAB_DEFAULTS__MODEL` → `defaults.model`
/// - `CONFAB_DEFAULTS__ENGINE_ID` → `defaults.engine_id`
/// - `CONFAB_DEFAULTS__TEMPERATURE` → `defaults.temperature`
/// - `CONFAB_DEFAULTS__CONTEXT_WINDOW` → `defaults.context_window`
/// - `CONFAB_DEFAULTS__MAX_TOKENS` → `defaults.max_tokens`
/// - `CONFAB_DISPATCH__MAX_ROUNDS` → `dispatch.max_rounds`
/// - `CONFAB_DISPATCH__TOOL_CALL_POLICY` → `dispatch.tool_call_policy`
/// - `CONFAB_ENGINES__<ID>__API_KEY` → `engines[id].options.api_key`
/// - `CONFAB_ENGINES__<ID>__URL` → `engines[id].options.url`
fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(val) = std::env::var("CONFAB_DEFAULTS__MODEL") {
        config.defaults.model = val;
    }
    if let Ok(val) = std::env::var("CONFAB_DEFAULTS__ENGINE_ID") {
        config.defaults.engine_id = val;
    }
    if let Ok(val) = std::env::var("CONFAB_DEFAULTS__TEMPERATURE") {
        if let Ok(t) = val.parse::<f64>() {
            config.defaults.temperature = Some(t);
        }
    }
    if let Ok(val) = std::env::var("CONFAB_DEFAULTS__CONTEXT_WINDOW") {
        if let Ok(n) = val.parse::<u32>() {
            config.defaults.context_window = Some(n);
        }
    }
    if let Ok(val) = std::env::var("CONFAB_DEFAULTS__MAX_TOKENS") {
        if let Ok(n) = val.parse::<u32>() {
            config.defaults.max_tokens = Some(n);
        }
    }
    if let Ok(val) = std::env::var("CONFAB_DISPATCH__MAX_ROUNDS") {
        if let Ok(n) = val.parse::<usize>() {
            config.dispatch.max_rounds = n;
        }
    }
    if let Ok(val) = std::env::var("CONFAB_DISPATCH__TOOL_CALL_POLICY") {
        match ToolCallPolicy::parse(&val) {
            Some(policy) => config.dispatch.tool_call_policy = policy,
            None => warn!("Ignoring unknown CONFAB_DISPATCH__TOOL_CALL_POLICY '{}'", val),
        }
    }

    for engine in &mut config.engines {
        let name = env_segment(&engine.id);
        if let Ok(val) = std::env::var(format!("CONFAB_ENGINES__{name}__API_KEY")) {
            engine.options.api_key = val;
        }
        if let Ok(val) = std::env::var(format!("CONFAB_ENGINES__{name}__URL")) {
            engine.options.url = Some(val);
        }
    }

    config
}

/// Engine id as it appears in an env var name (`my-openai` → `MY_OPENAI`).
fn env_segment(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ModelFilter;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp_json(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_missing_file() {
        let config = load_config_from_path(Path::new("/nonexistent/path/config.json"));
        assert_eq!(config.dispatch.max_rounds, 20);
        assert_eq!(config.engines[0].id, "ollama");
    }

    #[test]
    fn test_load_valid_json() {
        let file = write_temp_json(
            r#"{
            "engines": [
                { "id": "oai", "name": "OpenAI", "kind": "openai", "options": { "apiKey": "sk-1" } },
                { "id": "gem", "name": "Gemini", "kind": "gemini", "options": { "apiKey": "g-2" } }
            ],
            "modelFilters": { "openai": "all", "gemini": ["gemini-2.0-flash"] },
            "dispatch": { "maxRounds": 5, "toolCallPolicy": "allPerRound" }
        }"#,
        );

        let config = load_config_from_path(file.path());
        assert_eq!(config.engines.len(), 2);
        assert_eq!(config.engine("gem").unwrap().options.api_key, "g-2");
        assert_eq!(config.model_filter("openai"), ModelFilter::All);
        assert!(!config.model_filter("gemini").allows("gemini-1.5-pro"));
        assert_eq!(config.dispatch.max_rounds, 5);
        assert_eq!(config.dispatch.tool_call_policy, ToolCallPolicy::AllPerRound);
        // Default preserved
        assert_eq!(config.defaults.temperature, Some(0.8));
    }

    #[test]
    fn test_load_invalid_json_returns_defaults() {
        let file = write_temp_json("not valid json {{{");
        let config = load_config_from_path(file.path());
        assert_eq!(config.dispatch.max_rounds, 20);
    }

    #[test]
    fn test_load_bad_filter_returns_defaults() {
        let file = write_temp_json(r#"{ "modelFilters": { "openai": "everything" } }"#);
        let config = load_config_from_path(file.path());
        assert!(!config.model_filter("openai").allows("davinci-002"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.defaults.model = "openai:gpt-4o".to_string();
        config.engines[0].options.url = Some("http://gpu-box:11434".to_string());

        save_config(&config, Some(&path)).unwrap();

        let reloaded = load_config_from_path(&path);
        assert_eq!(reloaded.defaults.model, "openai:gpt-4o");
        assert_eq!(
            reloaded.engines[0].options.url.as_deref(),
            Some("http://gpu-box:11434")
        );
    }

    #[test]
    fn test_migrate_api_base_to_url() {
        let file = write_temp_json(
            r#"{
            "engines": [
                { "id": "a", "kind": "openai", "options": { "apiKey": "k", "apiBase": "https://old/v1" } },
                { "id": "b", "kind": "openai", "options": { "apiBase": "https://old/v1", "url": "https://new/v1" } }
            ]
        }"#,
        );

        let config = load_config_from_path(file.path());
        assert_eq!(config.engines[0].options.url.as_deref(), Some("https://old/v1"));
        // Existing value should NOT be overwritten by migration
        assert_eq!(config.engines[1].options.url.as_deref(), Some("https://new/v1"));
    }

    #[test]
    fn test_env_override_defaults() {
        std::env::set_var("CONFAB_DEFAULTS__ENGINE_ID", "gem");
        std::env::set_var("CONFAB_DEFAULTS__CONTEXT_WINDOW", "32768");
        let config = apply_env_overrides(Config::default());
        assert_eq!(config.defaults.engine_id, "gem");
        assert_eq!(config.defaults.context_window, Some(32768));
        std::env::remove_var("CONFAB_DEFAULTS__ENGINE_ID");
        std::env::remove_var("CONFAB_DEFAULTS__CONTEXT_WINDOW");
    }

    #[test]
    fn test_env_override_max_tokens_and_policy() {
        std::env::set_var("CONFAB_DEFAULTS__MAX_TOKENS", "2048");
        std::env::set_var("CONFAB_DISPATCH__TOOL_CALL_POLICY", "all_per_round");
        let config = apply_env_overrides(Config::default());
        assert_eq!(config.defaults.max_tokens, Some(2048));
        assert_eq!(config.dispatch.tool_call_policy, ToolCallPolicy::AllPerRound);

        // Unparseable values leave the loaded setting alone.
        std::env::set_var("CONFAB_DEFAULTS__MAX_TOKENS", "lots");
        std::env::set_var("CONFAB_DISPATCH__TOOL_CALL_POLICY", "sometimes");
        let mut config = Config::default();
        config.defaults.max_tokens = Some(512);
        config.dispatch.tool_call_policy = ToolCallPolicy::AllPerRound;
        let config = apply_env_overrides(config);
        assert_eq!(config.defaults.max_tokens, Some(512));
        assert_eq!(config.dispatch.tool_call_policy, ToolCallPolicy::AllPerRound);

        std::env::remove_var("CONFAB_DEFAULTS__MAX_TOKENS");
        std::env::remove_var("CONFAB_DISPATCH__TOOL_CALL_POLICY");
    }

    #[test]
    fn test_env_override_engine_key() {
        let mut config = Config::default();
        config.engines[0].id = "my-openai".to_string();

        std::env::set_var("CONFAB_ENGINES__MY_OPENAI__API_KEY", "sk-env-key");
        let config = apply_env_overrides(config);
        assert_eq!(config.engines[0].options.api_key, "sk-env-key");
        std::env::remove_var("CONFAB_ENGINES__MY_OPENAI__API_KEY");
    }

    #[test]
    fn test_saved_json_uses_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        save_config(&Config::default(), Some(&path)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&content).unwrap();

        assert!(raw["dispatch"].get("maxRounds").is_some());
        assert!(raw["dispatch"].get("max_rounds").is_none());
        assert_eq!(raw["modelFilters"]["openai"][0], "gpt-4o");
    }
}
