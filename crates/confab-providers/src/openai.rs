//! OpenAI chat-completions adapter.
//!
//! Flat role/content array, the canonical four roles kept as-is, tool
//! arguments serialized as a JSON string, tool schemas passed through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use confab_core::types::{EngineOptions, Message, Model, Role, Tool, ToolCall};

use crate::convert::arguments_from_value;
use crate::error::ProviderError;
use crate::http::{build_client, probe, resolve_base, send_json};
use crate::registry::{ProviderKind, ProviderSpec};
use crate::traits::{ChatOptions, Provider};

const PROVIDER: &str = "OpenAI";

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a Tool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<Map<String, Value>>,
}

// ─────────────────────────────────────────────
// Translation
// ─────────────────────────────────────────────

fn to_wire_messages(history: &[Message]) -> Vec<WireMessage> {
    history
        .iter()
        .map(|msg| WireMessage {
            role: msg.role.as_str(),
            content: msg.content.clone(),
            tool_calls: if msg.role == Role::Assistant {
                msg.tool_calls.iter().map(to_wire_tool_call).collect()
            } else {
                Vec::new()
            },
            tool_call_id: if msg.role == Role::Tool {
                msg.tool_call_id.clone()
            } else {
                None
            },
        })
        .collect()
}

fn to_wire_tool_call(call: &ToolCall) -> WireToolCall {
    WireToolCall {
        id: call.id.clone(),
        kind: "function",
        function: WireFunction {
            name: call.function.name.clone(),
            arguments: Value::Object(call.function.arguments.clone()).to_string(),
        },
    }
}

fn from_response(response: ChatResponse) -> Result<Message, ProviderError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::call(PROVIDER, "response contained no choices"))?;

    debug!(
        provider = PROVIDER,
        finish_reason = ?choice.finish_reason,
        "Chat response received"
    );

    let tool_calls = choice
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

    let content = choice.message.content.unwrap_or_default();
    Ok(Message::assistant_tool_calls(content, tool_calls).with_thought(choice.message.reasoning_content))
}

fn to_model(spec: &ProviderSpec, engine_id: &str, mut raw: Map<String, Value>) -> Option<Model> {
    let name = raw.remove("id")?.as_str()?.to_string();
    Some(Model {
        id: spec.model_id(&name),
        name,
        engine_id: engine_id.to_string(),
        supports_tools: true,
        metadata: raw,
    })
}

// ─────────────────────────────────────────────
// Provider
// ─────────────────────────────────────────────

/// Adapter for the OpenAI chat-completions API (and compatible proxies).
pub struct OpenAiProvider {
    client: reqwest::Client,
    engine_id: String,
    api_key: String,
    api_base: String,
    spec: &'static ProviderSpec,
}

impl OpenAiProvider {
    pub fn new(engine_id: &str, options: &EngineOptions) -> Self {
        let spec = ProviderKind::OpenAi.spec();
        Self {
            client: build_client(),
            engine_id: engine_id.to_string(),
            api_key: options.api_key.trim().to_string(),
            api_base: resolve_base(options, spec),
            spec,
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.api_key)
    }

    fn require_key(&self) -> Result<(), ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::call(PROVIDER, "no API key configured"));
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
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
            tool_choice: (!tools.is_empty()).then_some("auto"),
            temperature: options.temperature.map(|t| self.spec.clamp_temperature(t)),
            max_tokens: options.max_tokens,
        };

        debug!(
            provider = PROVIDER,
            model = %model.name,
            messages = body.messages.len(),
            tools = body.tools.len(),
            "Sending chat request"
        );

        let request = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body);

        from_response(send_json(PROVIDER, request).await?)
    }

    async fn models(&self) -> Result<Vec<Model>, ProviderError> {
        self.require_key()?;
        let list: ModelList = send_json(PROVIDER, self.get("/models")).await?;
        Ok(list
            .data
            .into_iter()
            .filter_map(|raw| to_model(self.spec, &self.engine_id, raw))
            .collect())
    }

    async fn info(&self, name: &str) -> Result<Model, ProviderError> {
        self.require_key()?;
        let raw: Map<String, Value> = send_json(PROVIDER, self.get(&format!("/models/{name}"))).await?;
        to_model(self.spec, &self.engine_id, raw)
            .ok_or_else(|| ProviderError::call(PROVIDER, format!("no metadata for model '{name}'")))
    }

    async fn connected(&self) -> bool {
        if self.api_key.is_empty() {
            return false;
        }
        probe(PROVIDER, self.get("/models")).await
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
