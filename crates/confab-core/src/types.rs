//! Canonical conversation model shared by every provider adapter.
//!
//! Adapters in `confab-providers` translate these types to and from each
//! provider's wire format. Nothing provider-specific is ever stored here:
//! roles are one of four values, tool arguments are always a structured map,
//! and reasoning text lives in `thought`, never in `content`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Structured tool-call arguments (string keys, arbitrary JSON values).
pub type Arguments = Map<String, Value>;

// ─────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────

/// Violations of the canonical message invariants.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("tool message requires a non-empty tool_call_id")]
    MissingToolCallId,

    #[error("{0} messages cannot carry tool calls")]
    UnexpectedToolCalls(Role),

    #[error("tool_call_id is only valid on tool messages (found on {0})")]
    UnexpectedToolCallId(Role),
}

// ─────────────────────────────────────────────
// Role
// ─────────────────────────────────────────────

/// The four canonical conversation roles.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────
// Message
// ─────────────────────────────────────────────

/// One turn in a conversation.
///
/// JSON uses camelCase keys so persisted sessions match the config surface.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    /// Visible text. May be empty for assistant messages that only call tools.
    #[serde(default)]
    pub content: String,
    /// Extracted reasoning text. Never rendered as visible reply text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    /// Requested tool invocations (assistant messages only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// The tool call this message answers (tool messages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Message {
            role,
            content: content.into(),
            thought: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            session_id: None,
            engine_id: None,
            model: None,
            created_at: Utc::now(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message with text content only.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create an assistant message carrying tool calls and optional text.
    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message {
            tool_calls,
            ..Self::new(Role::Assistant, content)
        }
    }

    /// Create a tool result message answering `tool_call_id`.
    ///
    /// Rejects an empty id: every tool result must point back at a tool call.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let id = tool_call_id.into();
        if id.is_empty() {
            return Err(ModelError::MissingToolCallId);
        }
        Ok(Message {
            tool_call_id: Some(id),
            ..Self::new(Role::Tool, content)
        })
    }

    /// Attach extracted reasoning text.
    pub fn with_thought(mut self, thought: Option<String>) -> Self {
        self.thought = thought.filter(|t| !t.trim().is_empty());
        self
    }

    /// Stamp the provenance fields set once a message belongs to a session.
    pub fn stamp(&mut self, session_id: &str, engine_id: Option<&str>, model: Option<&str>) {
        self.session_id = Some(session_id.to_string());
        if let Some(engine_id) = engine_id {
            self.engine_id = Some(engine_id.to_string());
        }
        if let Some(model) = model {
            self.model = Some(model.to_string());
        }
    }

    /// Whether the message requests any tool invocations.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Check the per-message invariants.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.role != Role::Assistant && !self.tool_calls.is_empty() {
            return Err(ModelError::UnexpectedToolCalls(self.role));
        }
        match (self.role, self.tool_call_id.as_deref()) {
            (Role::Tool, None) | (Role::Tool, Some("")) => Err(ModelError::MissingToolCallId),
            (Role::Tool, Some(_)) => Ok(()),
            (role, Some(_)) => Err(ModelError::UnexpectedToolCallId(role)),
            (_, None) => Ok(()),
        }
    }
}

/// Resolve a `tool_call_id` to the tool call that produced it.
///
/// Scans assistant messages in order and returns the first match.
pub fn find_tool_call<'a>(history: &'a [Message], tool_call_id: &str) -> Option<&'a ToolCall> {
    history
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .flat_map(|m| m.tool_calls.iter())
        .find(|tc| tc.id == tool_call_id)
}

// ─────────────────────────────────────────────
// Tool calls
// ─────────────────────────────────────────────

/// A single invocation request emitted by the model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Opaque id, unique within a conversation. Empty until synthesized
    /// when the provider omitted one.
    #[serde(default)]
    pub id: String,
    pub function: FunctionCall,
}

/// Function name plus structured arguments.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Arguments,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Arguments) -> Self {
        ToolCall {
            id: id.into(),
            function: FunctionCall {
                name: name.into(),
                arguments,
            },
        }
    }

    /// Generate a fresh, globally unique tool-call id.
    pub fn generate_id() -> String {
        format!("call_{}", uuid::Uuid::new_v4().simple())
    }

    /// Fill in a synthesized id when the provider left it empty.
    pub fn ensure_id(&mut self) -> &str {
        if self.id.trim().is_empty() {
            self.id = Self::generate_id();
        }
        &self.id
    }
}

// ─────────────────────────────────────────────
// Tool definitions
// ─────────────────────────────────────────────

/// Canonical function-calling schema offered to the model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: ToolParameters,
}

impl Tool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
    ) -> Self {
        Tool {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// JSON-Schema-like object describing a tool's parameters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolParameters {
    #[serde(rename = "type", default = "object_type")]
    pub kind: String,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, ToolProperty>,
}

fn object_type() -> String {
    "object".to_string()
}

impl Default for ToolParameters {
    fn default() -> Self {
        ToolParameters {
            kind: object_type(),
            required: Vec::new(),
            properties: BTreeMap::new(),
        }
    }
}

impl ToolParameters {
    /// Add a property with a JSON-Schema type and description.
    pub fn property(
        mut self,
        name: impl Into<String>,
        kind: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.properties.insert(
            name.into(),
            ToolProperty {
                kind: Some(kind.into()),
                description: Some(description.into()),
                extra: Map::new(),
            },
        );
        self
    }

    /// Mark a property as required.
    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }
}

/// One property in a tool's parameter schema.
///
/// Keywords other than `type` and `description` (`items`, `enum`, …) are kept
/// verbatim in `extra`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolProperty {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ─────────────────────────────────────────────
// Engines and models
// ─────────────────────────────────────────────

/// Credential and endpoint for one engine.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineOptions {
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl EngineOptions {
    /// Whether an API key has been supplied.
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// A configured connection to one provider, plus its synced models.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Engine {
    pub id: String,
    pub name: String,
    /// Provider kind tag (`"openai"`, `"anthropic"`, `"gemini"`, `"ollama"`).
    pub kind: String,
    #[serde(default)]
    pub options: EngineOptions,
    /// Replaced wholesale on every sync.
    #[serde(default)]
    pub models: Vec<Model>,
}

/// A model available through an engine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// `"<kind>:<name>"`, or the bare name for providers without a namespace.
    pub id: String,
    pub name: String,
    pub engine_id: String,
    #[serde(default)]
    pub supports_tools: bool,
    /// Provider-supplied metadata, never validated.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Metadata keys that may carry a per-model output token limit.
const OUTPUT_LIMIT_KEYS: &[&str] = &["outputTokenLimit", "maxOutputTokens", "max_tokens"];

impl Model {
    /// Best-effort read of a declared max-output-size hint.
    pub fn declared_output_limit(&self) -> Option<u32> {
        OUTPUT_LIMIT_KEYS
            .iter()
            .filter_map(|key| self.metadata.get(*key))
            .find_map(|v| v.as_u64())
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0)
    }
}

// ─────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────

/// Per-session dispatch settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Canonical model id.
    pub model: String,
    pub engine_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub enabled_tool_servers: Vec<String>,
}

/// A conversation: its settings plus append-only message history.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub config: SessionConfig,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new empty session.
    pub fn new(id: impl Into<String>, config: SessionConfig) -> Self {
        let now = Utc::now();
        Session {
            id: id.into(),
            config,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
