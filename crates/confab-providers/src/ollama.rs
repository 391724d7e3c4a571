//! Ollama `/api/chat` adapter.
//!
//! Local server, no credential needed. Flat roles with structured tool
//! arguments; reasoning comes back in a `thinking` field or as inline
//! `<think>` spans.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use confab_core::types::{EngineOptions, Message, Model, Role, Tool, ToolCall};

use crate::convert::{arguments_from_value, merge_thoughts, split_think_tags, tool_name_for};
use crate::error::ProviderError;
use crate::http::{build_client, probe, resolve_base, send_json};
use crate::registry::{ProviderKind, ProviderSpec};
use crate::traits::{ChatOptions, Provider};

const PROVIDER: &str = "Ollama";

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "RequestOptions::is_empty")]
    options: RequestOptions,
}

#[derive(Debug, Default, Serialize)]
struct RequestOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_ctx: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

impl RequestOptions {
    fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.num_ctx.is_none() && self.num_predict.is_none()
    }
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a Tool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
    #[serde(default)]
    done_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    models: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct ShowResponse {
    #[serde(default)]
    capabilities: Vec<String>,
    #[serde(default)]
    details: Map<String, Value>,
    #[serde(default)]
    model_info: Map<String, Value>,
}

// ─────────────────────────────────────────────
// Translation
// ─────────────────────────────────────────────

fn to_wire_messages(history: &[Message]) -> Vec<WireMessage> {
    history
        .iter()
        .map(|msg| {
            let is_assistant = msg.role == Role::Assistant;
            WireMessage {
                role: msg.role.as_str(),
                content: msg.content.clone(),
                thinking: if is_assistant { msg.thought.clone() } else { None },
                tool_calls: if is_assistant {
                    msg.tool_calls
                        .iter()
                        .map(|call| WireToolCall {
                            id: None,
                            function: WireFunction {
                                name: call.function.name.clone(),
                                arguments: Value::Object(call.function.arguments.clone()),
                            },
                        })
                        .collect()
                } else {
                    Vec::new()
                },
                tool_name: (msg.role == Role::Tool)
                    .then(|| tool_name_for(history, msg.tool_call_id.as_deref()))
                    .filter(|name| !name.is_empty()),
            }
        })
        .collect()
}

fn from_response(response: ChatResponse) -> Result<Message, ProviderError> {
    debug!(
        provider = PROVIDER,
        done_reason = ?response.done_reason,
        "Chat response received"
    );

    let tool_calls = response
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let arguments = arguments_from_value(PROVIDER, &tc.function.name, tc.function.arguments)?;
            let mut call = ToolCall::new(tc.id.unwrap_or_default(), tc.function.name, arguments);
            call.ensure_id();
            Ok(call)
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;

    let (content, inline_thought) = split_think_tags(&response.message.content);
    let thought = merge_thoughts(response.message.thinking, inline_thought);

    Ok(Message::assistant_tool_calls(content, tool_calls).with_thought(thought))
}

/// Context length from `model_info`, whose key is prefixed by the architecture.
fn context_length(model_info: &Map<String, Value>) -> Option<u64> {
    model_info
        .iter()
        .find(|(key, _)| key.ends_with(".context_length"))
        .and_then(|(_, v)| v.as_u64())
}

// ─────────────────────────────────────────────
// Provider
// ─────────────────────────────────────────────

/// Adapter for a local (or remote) Ollama server.
pub struct OllamaProvider {
    client: reqwest::Client,
    engine_id: String,
    api_key: String,
    api_base: String,
    spec: &'static ProviderSpec,
}

impl OllamaProvider {
    pub fn new(engine_id: &str, options: &EngineOptions) -> Self {
        let spec = ProviderKind::Ollama.spec();
        Self {
            client: build_client(),
            engine_id: engine_id.to_string(),
            api_key: options.api_key.trim().to_string(),
            api_base: resolve_base(options, spec),
            spec,
        }
    }

    /// Attach a bearer token only when one is configured (e.g. behind a proxy).
    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.api_key)
        }
    }

    fn model(&self, name: &str, supports_tools: bool, metadata: Map<String, Value>) -> Model {
        Model {
            id: self.spec.model_id(name),
            name: name.to_string(),
            engine_id: self.engine_id.clone(),
            supports_tools,
            metadata,
        }
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
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
        let body = ChatRequest {
            model: &model.name,
            messages: to_wire_messages(history),
            tools: tools
                .iter()
                .map(|t| WireTool {
                    kind: "function",
                    function: t,
                })
                .collect(),
            stream: false,
            options: RequestOptions {
                temperature: options.temperature.map(|t| self.spec.clamp_temperature(t)),
                num_ctx: options.context_window,
                num_predict: options.max_tokens,
            },
        };

        debug!(
            provider = PROVIDER,
            model = %model.name,
            messages = body.messages.len(),
            tools = body.tools.len(),
            "Sending chat request"
        );

        let request = self.authed(self.client.post(format!("{}/api/chat", self.api_base)));
        from_response(send_json(PROVIDER, request.json(&body)).await?)
    }

    async fn models(&self) -> Result<Vec<Model>, ProviderError> {
        let request = self.authed(self.client.get(format!("{}/api/tags", self.api_base)));
        let tags: TagList = send_json(PROVIDER, request).await?;

        let mut models = Vec::with_capacity(tags.models.len());
        for entry in tags.models {
            let Some(name) = entry.get("name").and_then(Value::as_str).map(String::from) else {
                continue;
            };
            match self.info(&name).await {
                Ok(model) => models.push(model),
                Err(e) => {
                    warn!(provider = PROVIDER, model = %name, error = %e, "Model details unavailable");
                    models.push(self.model(&name, false, entry));
                }
            }
        }
        Ok(models)
    }

    async fn info(&self, name: &str) -> Result<Model, ProviderError> {
        let request = self
            .authed(self.client.post(format!("{}/api/show", self.api_base)))
            .json(&json!({ "model": name }));
        let show: ShowResponse = send_json(PROVIDER, request).await?;

        let supports_tools = show.capabilities.iter().any(|c| c == "tools");
        let mut metadata = Map::new();
        if let Some(ctx) = context_length(&show.model_info) {
            metadata.insert("contextLength".into(), json!(ctx));
        }
        metadata.insert("capabilities".into(), json!(show.capabilities));
        metadata.insert("details".into(), Value::Object(show.details));

        Ok(self.model(name, supports_tools, metadata))
    }

    async fn connected(&self) -> bool {
        let request = self.authed(self.client.get(format!("{}/api/version", self.api_base)));
        probe(PROVIDER, request).await
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
