//! Provider layer for Confab.
//!
//! Translates the canonical conversation model to and from each backend's
//! wire format and keeps the configured engines' model lists in sync.
//!
//! # Architecture
//!
//! - [`traits::Provider`] — trait that all adapters implement
//! - [`registry`] — static specs for the four backends + the kind → adapter table
//! - [`openai`], [`anthropic`], [`gemini`], [`ollama`] — the adapters
//! - [`engines::EngineRegistry`] — live adapters per engine, concurrent model sync

pub mod anthropic;
mod convert;
pub mod engines;
pub mod error;
pub mod gemini;
mod http;
pub mod ollama;
pub mod openai;
pub mod registry;
pub mod traits;

// Re-export main types for convenience
pub use engines::{EngineRegistry, SyncOutcome, SyncReport};
pub use error::ProviderError;
pub use registry::{build_provider, ProviderKind, ProviderSpec, PROVIDERS};
pub use traits::{ChatOptions, Provider};
