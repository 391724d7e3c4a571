//! Provider trait — the seam every backend adapter implements.
//!
//! An adapter owns one engine's credential and endpoint and translates the
//! canonical conversation model to and from its provider's wire format.

use async_trait::async_trait;
use confab_core::types::{Message, Model, SessionConfig, Tool};

use crate::error::ProviderError;
use crate::registry::ProviderKind;

/// Per-call sampling options, taken from the session config.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatOptions {
    /// Requested temperature; each adapter clamps it to its provider's range.
    pub temperature: Option<f64>,
    /// Context-window hint (only some providers honor it).
    pub context_window: Option<u32>,
    /// Explicit output limit. Adapters that require one fall back to the
    /// model's declared limit, then to a per-variant default.
    pub max_tokens: Option<u32>,
}

impl From<&SessionConfig> for ChatOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            temperature: config.temperature,
            context_window: config.context_window,
            max_tokens: config.max_tokens,
        }
    }
}

/// Trait that all provider adapters implement.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Which backend this adapter speaks to.
    fn kind(&self) -> ProviderKind;

    /// Id of the engine this adapter was built for.
    fn engine_id(&self) -> &str;

    /// Send one request built from `history` and `tools`, and translate the
    /// reply into a single canonical assistant message.
    ///
    /// `history` is never mutated. Tool calls in the reply always carry a
    /// non-empty id. No retries happen here.
    async fn chat(
        &self,
        model: &Model,
        history: &[Message],
        tools: &[Tool],
        options: &ChatOptions,
    ) -> Result<Message, ProviderError>;

    /// Enumerate the models this engine can serve. An empty list is a valid answer.
    async fn models(&self) -> Result<Vec<Model>, ProviderError>;

    /// Metadata for one model by name, without a prior `models()` call.
    async fn info(&self, name: &str) -> Result<Model, ProviderError>;

    /// Cheapest live check. Never fails: every error maps to `false`.
    async fn connected(&self) -> bool;
}
