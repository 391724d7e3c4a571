//! Gemini `generateContent` adapter.
//!
//! Turns use the `user` and `model` roles. System text goes to
//! `systemInstruction`, tool results are `functionResponse` parts that must
//! name the function they answer, and schema types are enumerated tags.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use confab_core::types::{EngineOptions, Message, Model, Role, Tool, ToolCall, ToolProperty};

use crate::convert::{arguments_from_value, system_prompt, tool_name_for, trim_quote_artifacts};
use crate::error::ProviderError;
use crate::http::{build_client, probe, resolve_base, send_json};
use crate::registry::{ProviderKind, ProviderSpec};
use crate::traits::{ChatOptions, Provider};

const PROVIDER: &str = "Gemini";

/// `maxOutputTokens` when neither the caller nor the model metadata sets one.
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8192;

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolGroup>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

/// A content part. Gemini discriminates parts by which key is present.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCallData,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponseData,
    },
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        thought: bool,
    },
    /// Inline data, executable code, and other parts this layer ignores.
    Other(Value),
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCallData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponseData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolGroup {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct FunctionDeclaration {
    name: String,
    description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parameters: Option<Schema>,
}

/// Gemini's enumerated schema type tags.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl SchemaType {
    /// Map a JSON-Schema type name. Unknown or absent types become `STRING`.
    fn from_json_type(kind: Option<&str>) -> Self {
        match kind.map(str::to_ascii_lowercase).as_deref() {
            Some("number") => SchemaType::Number,
            Some("integer") => SchemaType::Integer,
            Some("boolean") => SchemaType::Boolean,
            Some("array") => SchemaType::Array,
            Some("object") => SchemaType::Object,
            _ => SchemaType::String,
        }
    }

    fn as_json_type(self) -> &'static str {
        match self {
            SchemaType::String => "string",
            SchemaType::Number => "number",
            SchemaType::Integer => "integer",
            SchemaType::Boolean => "boolean",
            SchemaType::Array => "array",
            SchemaType::Object => "object",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Schema {
    #[serde(rename = "type")]
    kind: SchemaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    properties: BTreeMap<String, Schema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    required: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    items: Option<Box<Schema>>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    enum_values: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelList {
    #[serde(default)]
    models: Vec<Map<String, Value>>,
}

// ─────────────────────────────────────────────
// Translation
// ─────────────────────────────────────────────

fn to_contents(history: &[Message]) -> Vec<Content> {
    let mut contents: Vec<Content> = Vec::new();

    for msg in history {
        let (role, parts) = match msg.role {
            Role::System => continue,
            Role::User => ("user", vec![text_part(&msg.content)]),
            Role::Assistant => ("model", model_parts(msg)),
            Role::Tool => ("user", vec![function_response(history, msg)]),
        };

        match contents.last_mut() {
            Some(last) if last.role.as_deref() == Some(role) => last.parts.extend(parts),
            _ => contents.push(Content {
                role: Some(role.to_string()),
                parts,
            }),
        }
    }

    contents
}

fn text_part(text: &str) -> Part {
    Part::Text {
        text: text.to_string(),
        thought: false,
    }
}

fn model_parts(msg: &Message) -> Vec<Part> {
    let mut parts = Vec::new();
    if !msg.content.is_empty() {
        parts.push(text_part(&msg.content));
    }
    for call in &msg.tool_calls {
        parts.push(Part::FunctionCall {
            function_call: FunctionCallData {
                id: Some(call.id.clone()),
                name: call.function.name.clone(),
                args: Value::Object(call.function.arguments.clone()),
            },
        });
    }
    if parts.is_empty() {
        parts.push(text_part(""));
    }
    parts
}

fn function_response(history: &[Message], msg: &Message) -> Part {
    Part::FunctionResponse {
        function_response: FunctionResponseData {
            id: msg.tool_call_id.clone(),
            name: tool_name_for(history, msg.tool_call_id.as_deref()),
            response: json!({ "result": msg.content }),
        },
    }
}

fn to_declaration(tool: &Tool) -> FunctionDeclaration {
    let params = &tool.parameters;
    // Gemini rejects an OBJECT schema with no properties; a parameterless tool omits it.
    let parameters = (!params.properties.is_empty()).then(|| Schema {
        kind: SchemaType::from_json_type(Some(&params.kind)),
        description: None,
        properties: params
            .properties
            .iter()
            .map(|(name, prop)| (name.clone(), property_schema(prop)))
            .collect(),
        required: params.required.clone(),
        items: None,
        enum_values: None,
    });

    FunctionDeclaration {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters,
    }
}

fn property_schema(prop: &ToolProperty) -> Schema {
    let kind = SchemaType::from_json_type(prop.kind.as_deref());
    structured_schema(kind, prop.description.clone(), Some(&prop.extra))
}

/// Schema for a nested JSON-Schema value (array items, object properties).
fn value_schema(value: Option<&Value>) -> Schema {
    let fields = value.and_then(Value::as_object);
    let kind = SchemaType::from_json_type(fields.and_then(|f| f.get("type")).and_then(Value::as_str));
    let description = fields
        .and_then(|f| f.get("description"))
        .and_then(Value::as_str)
        .map(String::from);
    structured_schema(kind, description, fields)
}

/// Carry `properties`, `required`, `items` and `enum` over, recursing into children.
fn structured_schema(
    kind: SchemaType,
    description: Option<String>,
    fields: Option<&Map<String, Value>>,
) -> Schema {
    let field = |key: &str| fields.and_then(|f| f.get(key));

    let properties = match field("properties").and_then(Value::as_object) {
        Some(props) if kind == SchemaType::Object => props
            .iter()
            .map(|(name, value)| (name.clone(), value_schema(Some(value))))
            .collect(),
        _ => BTreeMap::new(),
    };

    Schema {
        kind,
        description,
        properties,
        required: string_list(field("required")).unwrap_or_default(),
        items: (kind == SchemaType::Array).then(|| Box::new(value_schema(field("items")))),
        enum_values: string_list(field("enum")),
    }
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    let items = value?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
    )
}

fn from_response(response: GenerateResponse) -> Result<Message, ProviderError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.get("blockReason"))
            .and_then(Value::as_str)
            .unwrap_or("no candidates returned")
            .to_string();
        return Err(ProviderError::call(PROVIDER, format!("empty response: {reason}")));
    };

    debug!(
        provider = PROVIDER,
        finish_reason = ?candidate.finish_reason,
        "Chat response received"
    );

    let mut text = String::new();
    let mut thoughts: Vec<String> = Vec::new();
    let mut tool_calls = Vec::new();

    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        match part {
            Part::Text { text: t, thought: true } => thoughts.push(t),
            Part::Text { text: t, .. } => text.push_str(&t),
            Part::FunctionCall { function_call } => {
                let arguments = arguments_from_value(PROVIDER, &function_call.name, function_call.args)?;
                let mut call =
                    ToolCall::new(function_call.id.unwrap_or_default(), function_call.name, arguments);
                call.ensure_id();
                tool_calls.push(call);
            }
            Part::FunctionResponse { .. } | Part::Other(_) => {}
        }
    }

    let thought = (!thoughts.is_empty()).then(|| thoughts.join("\n"));
    Ok(Message::assistant_tool_calls(trim_quote_artifacts(&text), tool_calls).with_thought(thought))
}

/// Build a canonical model from a raw `models/...` entry.
fn to_model(spec: &ProviderSpec, engine_id: &str, raw: Map<String, Value>) -> Option<Model> {
    let full = raw.get("name")?.as_str()?;
    let name = full.strip_prefix("models/").unwrap_or(full).to_string();
    let supports_tools = supports_generate(&raw);
    Some(Model {
        id: spec.model_id(&name),
        name,
        engine_id: engine_id.to_string(),
        supports_tools,
        metadata: raw,
    })
}

fn supports_generate(raw: &Map<String, Value>) -> bool {
    raw.get("supportedGenerationMethods")
        .and_then(Value::as_array)
        .is_some_and(|methods| methods.iter().any(|m| m == "generateContent"))
}

// ─────────────────────────────────────────────
// Provider
// ─────────────────────────────────────────────

/// Adapter for the Gemini API.
pub struct GeminiProvider {
    client: reqwest::Client,
    engine_id: String,
    api_key: String,
    api_base: String,
    spec: &'static ProviderSpec,
}

impl GeminiProvider {
    pub fn new(engine_id: &str, options: &EngineOptions) -> Self {
        let spec = ProviderKind::Gemini.spec();
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
            .get(format!("{}/v1beta/{}", self.api_base, path))
            .header("x-goog-api-key", &self.api_key)
    }

    fn require_key(&self) -> Result<(), ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::call(PROVIDER, "no API key configured"));
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
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
        let body = GenerateRequest {
            contents: to_contents(history),
            system_instruction: system_prompt(history).map(|text| Content {
                role: None,
                parts: vec![text_part(&text)],
            }),
            tools: if tools.is_empty() {
                Vec::new()
            } else {
                vec![ToolGroup {
                    function_declarations: tools.iter().map(to_declaration).collect(),
                }]
            },
            generation_config: GenerationConfig {
                temperature: options.temperature.map(|t| self.spec.clamp_temperature(t)),
                max_output_tokens: options
                    .max_tokens
                    .or_else(|| model.declared_output_limit())
                    .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
            },
        };

        debug!(
            provider = PROVIDER,
            model = %model.name,
            contents = body.contents.len(),
            "Sending chat request"
        );

        let request = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.api_base, model.name
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body);

        from_response(send_json(PROVIDER, request).await?)
    }

    async fn models(&self) -> Result<Vec<Model>, ProviderError> {
        self.require_key()?;
        let list: ModelList = send_json(PROVIDER, self.get("models?pageSize=1000")).await?;
        Ok(list
            .models
            .into_iter()
            .filter(supports_generate)
            .filter_map(|raw| to_model(self.spec, &self.engine_id, raw))
            .collect())
    }

    async fn info(&self, name: &str) -> Result<Model, ProviderError> {
        self.require_key()?;
        let name = name.strip_prefix("models/").unwrap_or(name);
        let raw: Map<String, Value> = send_json(PROVIDER, self.get(&format!("models/{name}"))).await?;
        to_model(self.spec, &self.engine_id, raw)
            .ok_or_else(|| ProviderError::call(PROVIDER, format!("no metadata for model '{name}'")))
    }

    async fn connected(&self) -> bool {
        if self.api_key.is_empty() {
            return false;
        }
        probe(PROVIDER, self.get("models?pageSize=1")).await
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
