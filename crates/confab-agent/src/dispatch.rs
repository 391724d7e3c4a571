//! Dispatch loop — the model ↔ tool exchange for one conversation.
//!
//! Each round sends the full history plus the session's tool set to the
//! engine's adapter. A reply with no tool calls ends the dispatch; otherwise
//! the requested calls are executed, both sides of every call are persisted,
//! and the model is asked again.
//!
//! Everything persisted before a failure stays persisted: history is
//! append-only and nothing is rolled back.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use confab_core::config::{DispatchSettings, ToolCallPolicy};
use confab_core::session::MessageStore;
use confab_core::types::{Message, Model, Session, SessionConfig, ToolCall};
use confab_providers::{ChatOptions, EngineRegistry, Provider, ProviderError};

use crate::tools::ToolServer;

/// Default maximum model rounds per dispatch.
const DEFAULT_MAX_ROUNDS: usize = 20;

/// Loop limits for a [`Dispatcher`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Model rounds allowed before giving up with
    /// [`DispatchError::MaxRoundsExceeded`].
    pub max_rounds: usize,
    pub policy: ToolCallPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            policy: ToolCallPolicy::OnePerRound,
        }
    }
}

impl From<&DispatchSettings> for DispatchConfig {
    fn from(settings: &DispatchSettings) -> Self {
        Self {
            max_rounds: settings.max_rounds.max(1),
            policy: settings.tool_call_policy,
        }
    }
}

/// Why a dispatch stopped without a final answer.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("session '{0}' not found")]
    SessionNotFound(String),

    #[error("engine '{0}' not found")]
    EngineNotFound(String),

    #[error("model '{model}' not found on engine '{engine}'")]
    ModelNotFound { engine: String, model: String },

    #[error("engine '{engine}' has unsupported provider kind '{kind}'")]
    UnknownProviderKind { engine: String, kind: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("no final answer after {0} model rounds")]
    MaxRoundsExceeded(usize),

    #[error("message store failed: {0:#}")]
    Store(anyhow::Error),
}

/// Runs conversations against the configured engines.
///
/// Holds no per-conversation state, so one dispatcher can serve many
/// sessions concurrently.
pub struct Dispatcher {
    registry: Arc<EngineRegistry>,
    tools: Arc<dyn ToolServer>,
    store: Arc<dyn MessageStore>,
    config: DispatchConfig,
}

/// Adapter and model a session resolved to.
struct Target {
    adapter: Arc<dyn Provider>,
    model: Model,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<EngineRegistry>,
        tools: Arc<dyn ToolServer>,
        store: Arc<dyn MessageStore>,
        config: DispatchConfig,
    ) -> Self {
        info!(
            max_rounds = config.max_rounds,
            policy = ?config.policy,
            "dispatcher initialized"
        );
        Self {
            registry,
            tools,
            store,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Persist a user message, then dispatch.
    pub async fn send(&self, session_id: &str, text: &str) -> Result<Message, DispatchError> {
        let mut message = Message::user(text);
        message.stamp(session_id, None, None);
        self.store
            .save_message(message)
            .map_err(DispatchError::Store)?;
        self.dispatch(session_id).await
    }

    /// Run model rounds until the model answers without tool calls.
    ///
    /// Returns the final assistant message, already persisted.
    pub async fn dispatch(&self, session_id: &str) -> Result<Message, DispatchError> {
        let mut session = self
            .store
            .find_session(session_id)
            .ok_or_else(|| DispatchError::SessionNotFound(session_id.to_string()))?;

        let target = self.resolve(&session.config).await?;
        let options = ChatOptions::from(&session.config);

        for round in 1..=self.config.max_rounds {
            let tools = match self.tools.list_tools(&session).await {
                Ok(tools) => tools,
                Err(e) => {
                    warn!(session = session_id, error = %e, "tool listing failed, continuing without tools");
                    Vec::new()
                }
            };

            debug!(
                round = round,
                session = session_id,
                model = %target.model.id,
                messages = session.messages.len(),
                tools = tools.len(),
                "model call"
            );

            let reply = target
                .adapter
                .chat(&target.model, &session.messages, &tools, &options)
                .await?;

            if !reply.has_tool_calls() {
                info!(
                    session = session_id,
                    round = round,
                    content_len = reply.content.len(),
                    "dispatch complete"
                );
                return self.persist(&mut session, reply, &target.model);
            }

            let Message {
                content,
                thought,
                tool_calls,
                ..
            } = reply;

            let batch = match self.config.policy {
                ToolCallPolicy::OnePerRound => {
                    if tool_calls.len() > 1 {
                        debug!(
                            deferred = tool_calls.len() - 1,
                            "executing first tool call only, model will be asked again"
                        );
                    }
                    tool_calls.into_iter().take(1).collect()
                }
                ToolCallPolicy::AllPerRound => tool_calls,
            };

            for (index, call) in batch.into_iter().enumerate() {
                // Reply text and reasoning travel with the first call only.
                let (text, thought) = if index == 0 {
                    (content.clone(), thought.clone())
                } else {
                    (String::new(), None)
                };
                self.handle_call(&mut session, &target.model, call, text, thought)
                    .await?;
            }
        }

        warn!(
            session = session_id,
            max_rounds = self.config.max_rounds,
            "dispatch exceeded max rounds"
        );
        Err(DispatchError::MaxRoundsExceeded(self.config.max_rounds))
    }

    /// Persist one tool call, run it, persist its result.
    async fn handle_call(
        &self,
        session: &mut Session,
        model: &Model,
        mut call: ToolCall,
        text: String,
        thought: Option<String>,
    ) -> Result<(), DispatchError> {
        call.ensure_id();

        let request = Message::assistant_tool_calls(text, vec![call.clone()]).with_thought(thought);
        self.persist(session, request, model)?;

        let name = call.function.name.as_str();
        info!(
            session = %session.id,
            tool = name,
            call_id = %call.id,
            "executing tool call"
        );

        let answer = match self
            .tools
            .execute_tool(session, name, &call.function.arguments)
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = name, error = %e, "tool execution failed");
                format!("Error executing {name}: {e:#}")
            }
        };

        let result = Message::tool_result(call.id.as_str(), answer)
            .map_err(|e| DispatchError::Store(e.into()))?;
        self.persist(session, result, model)?;
        Ok(())
    }

    /// Stamp provenance, save, and append to the in-memory history.
    fn persist(
        &self,
        session: &mut Session,
        mut message: Message,
        model: &Model,
    ) -> Result<Message, DispatchError> {
        message.stamp(&session.id, Some(&model.engine_id), Some(&model.id));
        let saved = self
            .store
            .save_message(message)
            .map_err(DispatchError::Store)?;
        session.messages.push(saved.clone());
        Ok(saved)
    }

    /// Find the adapter and model a session is configured for.
    ///
    /// Prefers the engine's synced model list; a model missing from it is
    /// looked up through the adapter directly.
    async fn resolve(&self, config: &SessionConfig) -> Result<Target, DispatchError> {
        let engine = self
            .registry
            .engine(&config.engine_id)
            .ok_or_else(|| DispatchError::EngineNotFound(config.engine_id.clone()))?;

        let adapter = self.registry.adapter(&engine.id).ok_or_else(|| {
            DispatchError::UnknownProviderKind {
                engine: engine.id.clone(),
                kind: engine.kind.clone(),
            }
        })?;

        let not_found = || DispatchError::ModelNotFound {
            engine: engine.id.clone(),
            model: config.model.clone(),
        };

        if let Some(model) = self.registry.engine_model(&engine.id, &config.model) {
            return Ok(Target {
                adapter,
                model: model.clone(),
            });
        }
        if config.model.trim().is_empty() {
            return Err(not_found());
        }

        let spec = adapter.kind().spec();
        let name = spec
            .namespace
            .and_then(|ns| config.model.strip_prefix(ns)?.strip_prefix(':'))
            .unwrap_or(config.model.as_str());

        debug!(engine = %engine.id, model = name, "model not synced, asking provider");
        match adapter.info(name).await {
            Ok(model) => Ok(Target { adapter, model }),
            Err(e) => {
                warn!(engine = %engine.id, model = name, error = %e, "model lookup failed");
                Err(not_found())
            }
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
