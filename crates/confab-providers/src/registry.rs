//! Provider registry — static specs for the four supported backends and the
//! fixed kind → adapter table.
//!
//! Each `ProviderSpec` describes how to reach a provider: its config tag,
//! default endpoint, credential requirement, model-id namespace, and the
//! temperature range it accepts.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use confab_core::config::EngineConfig;

use crate::anthropic::AnthropicProvider;
use crate::gemini::GeminiProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;
use crate::traits::Provider;

// ─────────────────────────────────────────────
// ProviderKind — closed set of backends
// ─────────────────────────────────────────────

/// The supported provider backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
    Ollama,
}

impl ProviderKind {
    /// Resolve a config tag (`"openai"`, `"anthropic"`, …). Case-insensitive.
    pub fn parse(tag: &str) -> Option<Self> {
        find_by_name(&tag.trim().to_ascii_lowercase()).map(|spec| spec.kind)
    }

    /// The static spec for this kind.
    pub fn spec(self) -> &'static ProviderSpec {
        // PROVIDERS is laid out in declaration order.
        match self {
            ProviderKind::OpenAi => &PROVIDERS[0],
            ProviderKind::Anthropic => &PROVIDERS[1],
            ProviderKind::Gemini => &PROVIDERS[2],
            ProviderKind::Ollama => &PROVIDERS[3],
        }
    }

    /// Config tag for this kind.
    pub fn as_str(self) -> &'static str {
        self.spec().name
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────
// ProviderSpec — static metadata for one provider
// ─────────────────────────────────────────────

/// Static specification describing one provider backend.
#[derive(Clone, Debug)]
pub struct ProviderSpec {
    pub kind: ProviderKind,
    /// Config tag (e.g. `"gemini"`).
    pub name: &'static str,
    /// Human-readable name for logs and errors.
    pub display_name: &'static str,
    /// Endpoint used when the engine sets no `url`.
    pub default_api_base: &'static str,
    /// Whether an empty API key means the engine cannot connect.
    pub requires_api_key: bool,
    /// Prefix for canonical model ids (`"openai"` → `"openai:gpt-4o"`).
    /// `None` means model ids are bare names.
    pub namespace: Option<&'static str>,
    /// Accepted temperature range. `None` passes the value through.
    pub temperature_range: Option<(f64, f64)>,
}

impl ProviderSpec {
    /// Canonical model id for a provider-native model name.
    pub fn model_id(&self, name: &str) -> String {
        match self.namespace {
            Some(ns) => format!("{ns}:{name}"),
            None => name.to_string(),
        }
    }

    /// Clamp a requested temperature to this provider's accepted range.
    pub fn clamp_temperature(&self, temperature: f64) -> f64 {
        match self.temperature_range {
            Some((lo, hi)) => temperature.clamp(lo, hi),
            None => temperature,
        }
    }
}

/// All supported providers.
pub static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        kind: ProviderKind::OpenAi,
        name: "openai",
        display_name: "OpenAI",
        default_api_base: "https://api.openai.com/v1",
        requires_api_key: true,
        namespace: Some("openai"),
        temperature_range: Some((0.0, 2.0)),
    },
    ProviderSpec {
        kind: ProviderKind::Anthropic,
        name: "anthropic",
        display_name: "Anthropic",
        default_api_base: "https://api.anthropic.com",
        requires_api_key: true,
        namespace: Some("anthropic"),
        temperature_range: Some((0.01, 1.0)),
    },
    ProviderSpec {
        kind: ProviderKind::Gemini,
        name: "gemini",
        display_name: "Gemini",
        default_api_base: "https://generativelanguage.googleapis.com",
        requires_api_key: true,
        namespace: Some("gemini"),
        temperature_range: Some((0.0, 2.0)),
    },
    // Local server: no credential, bare model names, temperature untouched.
    ProviderSpec {
        kind: ProviderKind::Ollama,
        name: "ollama",
        display_name: "Ollama",
        default_api_base: "http://localhost:11434",
        requires_api_key: false,
        namespace: None,
        temperature_range: None,
    },
];

/// Find a provider spec by exact config tag.
pub fn find_by_name(name: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|spec| spec.name == name)
}

/// Build the adapter for a persisted engine record.
///
/// Unknown kinds yield `None`; the caller decides how to surface that.
pub fn build_provider(engine: &EngineConfig) -> Option<Arc<dyn Provider>> {
    let Some(kind) = ProviderKind::parse(&engine.kind) else {
        warn!(engine = %engine.id, kind = %engine.kind, "Unknown provider kind");
        return None;
    };

    let provider: Arc<dyn Provider> = match kind {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(&engine.id, &engine.options)),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(&engine.id, &engine.options)),
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(&engine.id, &engine.options)),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(&engine.id, &engine.options)),
    };
    Some(provider)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
