//! Provider error taxonomy.

use thiserror::Error;

/// Failures surfaced by a provider adapter. No variant is retried internally.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport, authentication, or API failure.
    #[error("{provider} call failed{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Call {
        provider: &'static str,
        /// HTTP status when the provider answered.
        status: Option<u16>,
        message: String,
    },

    /// A tool-call payload could not be decoded into an argument map.
    #[error("{provider} returned malformed arguments for tool '{tool}': {message}")]
    MalformedToolArguments {
        provider: &'static str,
        tool: String,
        message: String,
    },
}

impl ProviderError {
    pub(crate) fn call(provider: &'static str, message: impl Into<String>) -> Self {
        ProviderError::Call {
            provider,
            status: None,
            message: message.into(),
        }
    }

    pub(crate) fn status(provider: &'static str, status: u16, message: impl Into<String>) -> Self {
        ProviderError::Call {
            provider,
            status: Some(status),
            message: message.into(),
        }
    }

    /// HTTP status carried by a call failure, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Call { status, .. } => *status,
            ProviderError::MalformedToolArguments { .. } => None,
        }
    }
}
