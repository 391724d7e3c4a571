//! Anthropic messages adapter.
//!
//! Block-structured turns with only `user` and `assistant` roles. System
//! text travels in the top-level `system` field, tool results are
//! `tool_result` blocks inside a user turn, and `max_tokens` is mandatory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use confab_core::types::{EngineOptions, Message, Model, Role, Tool, ToolCall, ToolParameters};

use crate::convert::{arguments_from_value, system_prompt};
use crate::error::ProviderError;
use crate::http::{build_client, probe, resolve_base, send_json};
use crate::registry::{ProviderKind, ProviderSpec};
use crate::traits::{ChatOptions, Provider};

const PROVIDER: &str = "Anthropic";
const API_VERSION: &str = "2023-06-01";

/// Output limit for variants not matched below.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Per-family output limits, matched by substring of the model name.
const VARIANT_MAX_TOKENS: &[(&str, u32)] = &[
    ("opus", 32_000),
    ("sonnet", 64_000),
    ("haiku", 8_192),
];

/// Models offered without a listing call.
const CURATED_MODELS: &[(&str, &str)] = &[
    ("claude-opus-4-1-20250805", "Claude Opus 4.1"),
    ("claude-opus-4-20250514", "Claude Opus 4"),
    ("claude-sonnet-4-20250514", "Claude Sonnet 4"),
    ("claude-3-7-sonnet-20250219", "Claude Sonnet 3.7"),
    ("claude-3-5-haiku-20241022", "Claude Haiku 3.5"),
];

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Turn>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
struct Turn {
    role: &'static str,
    content: Vec<Block>,
}

/// One content block, in either direction.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
        #[serde(default)]
        signature: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    /// Redacted thinking, server tool blocks, and anything newer.
    #[serde(other)]
    Other,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a ToolParameters,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<Block>,
    #[serde(default)]
    stop_reason: Option<String>,
}

// ─────────────────────────────────────────────
// Translation
// ─────────────────────────────────────────────

fn to_turns(history: &[Message]) -> Vec<Turn> {
    let mut turns: Vec<Turn> = Vec::new();

    for msg in history {
        let (role, blocks) = match msg.role {
            Role::System => continue,
            Role::User => ("user", vec![Block::Text {
                text: msg.content.clone(),
            }]),
            Role::Assistant => ("assistant", assistant_blocks(msg)),
            Role::Tool => ("user", vec![Block::ToolResult {
                tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                content: msg.content.clone(),
            }]),
        };

        // Consecutive same-role turns are merged; the API rejects them otherwise.
        match turns.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => turns.push(Turn {
                role,
                content: blocks,
            }),
        }
    }

    turns
}

fn assistant_blocks(msg: &Message) -> Vec<Block> {
    // Thinking blocks need the server's signature, which is not kept; the thought is dropped.
    let mut blocks = Vec::new();

    if !msg.content.is_empty() {
        blocks.push(Block::Text {
            text: msg.content.clone(),
        });
    }
    for call in &msg.tool_calls {
        blocks.push(Block::ToolUse {
            id: call.id.clone(),
            name: call.function.name.clone(),
            input: Value::Object(call.function.arguments.clone()),
        });
    }

    if blocks.is_empty() {
        blocks.push(Block::Text {
            text: String::new(),
        });
    }
    blocks
}

fn from_response(response: MessagesResponse) -> Result<Message, ProviderError> {
    debug!(
        provider = PROVIDER,
        stop_reason = ?response.stop_reason,
        blocks = response.content.len(),
        "Chat response received"
    );

    let mut text = String::new();
    let mut thoughts: Vec<String> = Vec::new();
    let mut tool_calls = Vec::new();

    for block in response.content {
        match block {
            Block::Text { text: t } => text.push_str(&t),
            Block::Thinking { thinking, .. } => thoughts.push(thinking),
            Block::ToolUse { id, name, input } => {
                let arguments = arguments_from_value(PROVIDER, &name, input)?;
                let mut call = ToolCall::new(id, name, arguments);
                call.ensure_id();
                tool_calls.push(call);
            }
            Block::ToolResult { .. } | Block::Other => {}
        }
    }

    let thought = (!thoughts.is_empty()).then(|| thoughts.join("\n"));
    Ok(Message::assistant_tool_calls(text, tool_calls).with_thought(thought))
}

/// Output limit when the caller sets none: declared limit, then family default.
fn default_max_tokens(model: &Model) -> u32 {
    if let Some(limit) = model.declared_output_limit() {
        return limit;
    }
    variant_max_tokens(&model.name)
}

fn variant_max_tokens(name: &str) -> u32 {
    let lower = name.to_lowercase();
    VARIANT_MAX_TOKENS
        .iter()
        .find(|(family, _)| lower.contains(family))
        .map(|(_, limit)| *limit)
        .unwrap_or(DEFAULT_MAX_TOKENS)
}

fn curated_model(spec: &ProviderSpec, engine_id: &str, name: &str, display_name: &str) -> Model {
    let mut metadata = Map::new();
    metadata.insert("displayName".into(), json!(display_name));
    metadata.insert("max_tokens".into(), json!(variant_max_tokens(name)));
    Model {
        id: spec.model_id(name),
        name: name.to_string(),
        engine_id: engine_id.to_string(),
        supports_tools: true,
        metadata,
    }
}

// ─────────────────────────────────────────────
// Provider
// ─────────────────────────────────────────────

/// Adapter for the Anthropic messages API.
pub struct AnthropicProvider {
    client: reqwest::Client,
    engine_id: String,
    api_key: String,
    api_base: String,
    spec: &'static ProviderSpec,
}

impl AnthropicProvider {
    pub fn new(engine_id: &str, options: &EngineOptions) -> Self {
        let spec = ProviderKind::Anthropic.spec();
        Self {
            client: build_client(),
            engine_id: engine_id.to_string(),
            api_key: options.api_key.trim().to_string(),
            api_base: resolve_base(options, spec),
            spec,
        }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn engine_id(&self) -> &str {
        &self.engine_id
    }

    async fn chat(
        &self,
        model: &Model,
        history: &[Message],
        tools: &[Tool],
        options: &ChatOptions,
    ) -> Result<Message, ProviderError> {
        let body = MessagesRequest {
            model: &model.name,
            max_tokens: options.max_tokens.unwrap_or_else(|| default_max_tokens(model)),
            system: system_prompt(history),
            messages: to_turns(history),
            tools: tools
                .iter()
                .map(|t| WireTool {
                    name: &t.name,
                    description: &t.description,
                    input_schema: &t.parameters,
                })
                .collect(),
            temperature: options.temperature.map(|t| self.spec.clamp_temperature(t)),
        };

        debug!(
            provider = PROVIDER,
            model = %model.name,
            turns = body.messages.len(),
            max_tokens = body.max_tokens,
            "Sending chat request"
        );

        let request = self.authed(self.client.post(format!("{}/v1/messages", self.api_base)));
        from_response(send_json(PROVIDER, request.json(&body)).await?)
    }

    async fn models(&self) -> Result<Vec<Model>, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::call(PROVIDER, "no API key configured"));
        }
        Ok(CURATED_MODELS
            .iter()
            .map(|(name, display)| curated_model(self.spec, &self.engine_id, name, display))
            .collect())
    }

    async fn info(&self, name: &str) -> Result<Model, ProviderError> {
        let display = CURATED_MODELS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, d)| *d)
            .unwrap_or(name);
        Ok(curated_model(self.spec, &self.engine_id, name, display))
    }

    async fn connected(&self) -> bool {
        if self.api_key.is_empty() {
            return false;
        }
        let request = self.authed(self.client.get(format!("{}/v1/models", self.api_base)));
        probe(PROVIDER, request).await
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use confab_core::types::Arguments;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, key: &str) -> AnthropicProvider {
        AnthropicProvider::new(
            "claude",
            &EngineOptions {
                api_key: key.to_string(),
                url: Some(server.uri()),
            },
        )
    }

    fn model(name: &str) -> Model {
        Model {
            id: format!("anthropic:{name}"),
            name: name.to_string(),
            engine_id: "claude".into(),
            supports_tools: true,
            metadata: Map::new(),
        }
    }

    fn text_reply(text: &str) -> Value {
        json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": text}],
            "stop_reason": "end_turn"
        })
    }

    #[test]
    fn test_system_messages_go_to_side_channel() {
        let history = vec![
            Message::system("A"),
            Message::system("B"),
            Message::user("hi"),
        ];

        assert_eq!(system_prompt(&history).as_deref(), Some("A\n\nB"));
        let turns = serde_json::to_value(to_turns(&history)).unwrap();
        assert_eq!(
            turns,
            json!([{"role": "user", "content": [{"type": "text", "text": "hi"}]}])
        );
    }

    #[test]
    fn test_empty_assistant_turn_gets_empty_text_block() {
        let turns = serde_json::to_value(to_turns(&[Message::assistant("")])).unwrap();
        assert_eq!(
            turns,
            json!([{"role": "assistant", "content": [{"type": "text", "text": ""}]}])
        );
    }

    #[test]
    fn test_assistant_blocks_text_then_tools_without_thought() {
        let mut args = Arguments::new();
        args.insert("location".into(), json!("NYC"));
        let msg = Message::assistant_tool_calls(
            "Checking.",
            vec![ToolCall::new("toolu_1", "get_weather", args)],
        )
        .with_thought(Some("user wants weather".into()));

        let blocks = serde_json::to_value(assistant_blocks(&msg)).unwrap();
        assert_eq!(blocks.as_array().unwrap().len(), 2);
        assert_eq!(blocks[0], json!({"type": "text", "text": "Checking."}));
        assert_eq!(
            blocks[1],
            json!({"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"location": "NYC"}})
        );
    }

    #[test]
    fn test_tool_results_merge_into_one_user_turn() {
        let history = vec![
            Message::user("weather in NYC and LA?"),
            Message::assistant_tool_calls(
                "",
                vec![
                    ToolCall::new("t1", "get_weather", Arguments::new()),
                    ToolCall::new("t2", "get_weather", Arguments::new()),
                ],
            ),
            Message::tool_result("t1", "sunny").unwrap(),
            Message::tool_result("t2", "rainy").unwrap(),
        ];

        let turns = serde_json::to_value(to_turns(&history)).unwrap();
        let turns = turns.as_array().unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[2]["role"], "user");
        assert_eq!(turns[2]["content"][0]["type"], "tool_result");
        assert_eq!(turns[2]["content"][0]["tool_use_id"], "t1");
        assert_eq!(turns[2]["content"][1]["tool_use_id"], "t2");
        assert_eq!(turns[2]["content"][1]["content"], "rainy");
    }

    #[test]
    fn test_default_max_tokens_by_variant() {
        assert_eq!(default_max_tokens(&model("claude-opus-4-20250514")), 32_000);
        assert_eq!(default_max_tokens(&model("claude-sonnet-4-20250514")), 64_000);
        assert_eq!(default_max_tokens(&model("claude-3-5-haiku-20241022")), 8_192);
        assert_eq!(default_max_tokens(&model("claude-2.1")), 4_096);

        let mut declared = model("claude-sonnet-4-20250514");
        declared.metadata.insert("max_tokens".into(), json!(1000));
        assert_eq!(default_max_tokens(&declared), 1000);
    }

    #[tokio::test]
    async fn test_chat_request_shape_and_temperature_clamp() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant"))
            .and(header("anthropic-version", API_VERSION))
            .and(body_partial_json(json!({
                "model": "claude-sonnet-4-20250514",
                "system": "A\n\nB",
                "max_tokens": 64000,
                "temperature": 1.0,
                "tools": [{
                    "name": "get_weather",
                    "description": "Weather",
                    "input_schema": {"type": "object", "required": ["location"]}
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("Hi there")))
            .expect(1)
            .mount(&server)
            .await;

        let tool = Tool::new(
            "get_weather",
            "Weather",
            ToolParameters::default()
                .property("location", "string", "City")
                .require("location"),
        );
        let history = vec![Message::system("A"), Message::system("B"), Message::user("hi")];
        let options = ChatOptions {
            temperature: Some(1.5),
            ..Default::default()
        };

        let reply = provider(&server, "sk-ant")
            .chat(&model("claude-sonnet-4-20250514"), &history, &[tool], &options)
            .await
            .unwrap();

        assert_eq!(reply.content, "Hi there");
    }

    #[tokio::test]
    async fn test_chat_ingests_thinking_and_tool_use() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    {"type": "thinking", "thinking": "Need the weather tool.", "signature": "sig"},
                    {"type": "redacted_thinking", "data": "xxx"},
                    {"type": "text", "text": "Let me check."},
                    {"type": "tool_use", "id": "toolu_9", "name": "get_weather", "input": {"location": "NYC"}},
                    {"type": "tool_use", "name": "get_time", "input": {}}
                ],
                "stop_reason": "tool_use"
            })))
            .mount(&server)
            .await;

        let reply = provider(&server, "sk-ant")
            .chat(&model("claude-opus-4-20250514"), &[Message::user("NYC?")], &[], &ChatOptions::default())
            .await
            .unwrap();

        assert_eq!(reply.content, "Let me check.");
        assert_eq!(reply.thought.as_deref(), Some("Need the weather tool."));
        assert_eq!(reply.tool_calls.len(), 2);
        assert_eq!(reply.tool_calls[0].id, "toolu_9");
        assert_eq!(reply.tool_calls[0].function.arguments["location"], "NYC");
        assert!(!reply.tool_calls[1].id.is_empty());
    }

    #[tokio::test]
    async fn test_chat_history_thought_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("72F")))
            .expect(1)
            .mount(&server)
            .await;

        let history = vec![
            Message::user("weather in NYC?"),
            Message::assistant("Checking now.").with_thought(Some("They want NYC.".into())),
            Message::user("and tomorrow?"),
        ];
        provider(&server, "sk-ant")
            .chat(&model("claude-sonnet-4-20250514"), &history, &[], &ChatOptions::default())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            body["messages"][1],
            json!({"role": "assistant", "content": [{"type": "text", "text": "Checking now."}]})
        );
        assert!(!String::from_utf8_lossy(&requests[0].body).contains("thinking"));
    }

    #[tokio::test]
    async fn test_chat_malformed_tool_input() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "tool_use", "id": "t", "name": "get_weather", "input": 42}]
            })))
            .mount(&server)
            .await;

        let err = provider(&server, "sk-ant")
            .chat(&model("claude-3-5-haiku-20241022"), &[Message::user("x")], &[], &ChatOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::MalformedToolArguments { .. }));
    }

    #[tokio::test]
    async fn test_chat_overloaded_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_json(json!({
                "type": "error",
                "error": {"type": "overloaded_error", "message": "Overloaded"}
            })))
            .mount(&server)
            .await;

        let err = provider(&server, "sk-ant")
            .chat(&model("claude-sonnet-4-20250514"), &[Message::user("x")], &[], &ChatOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(529));
        assert!(err.to_string().contains("Overloaded"));
    }

    #[tokio::test]
    async fn test_models_are_curated() {
        let server = MockServer::start().await;
        let models = provider(&server, "sk-ant").models().await.unwrap();

        assert_eq!(models.len(), CURATED_MODELS.len());
        assert!(models.iter().all(|m| m.id.starts_with("anthropic:")));
        let sonnet = models.iter().find(|m| m.name == "claude-sonnet-4-20250514").unwrap();
        assert_eq!(sonnet.declared_output_limit(), Some(64_000));
    }

    #[tokio::test]
    async fn test_models_without_key_fails() {
        let server = MockServer::start().await;
        assert!(provider(&server, "").models().await.is_err());
    }

    #[tokio::test]
    async fn test_info_unknown_name_uses_family_default() {
        let server = MockServer::start().await;
        let info = provider(&server, "sk-ant").info("claude-haiku-next").await.unwrap();
        assert_eq!(info.id, "anthropic:claude-haiku-next");
        assert_eq!(info.declared_output_limit(), Some(8_192));
    }

    #[tokio::test]
    async fn test_connected_empty_key_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        assert!(!provider(&server, "  ").connected().await);
    }

    #[tokio::test]
    async fn test_connected_probe_sends_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .and(header("x-api-key", "sk-ant"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(1)
            .mount(&server)
            .await;

        assert!(provider(&server, "sk-ant").connected().await);
    }
}
