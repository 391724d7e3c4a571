//! Shared HTTP plumbing for the provider adapters.
//!
//! Every adapter talks JSON over `reqwest`; this module owns client
//! construction, base-URL resolution, status handling, and the short
//! connectivity probe.

use std::time::Duration;

use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use confab_core::types::EngineOptions;

use crate::error::ProviderError;
use crate::registry::ProviderSpec;

/// Timeout for a full chat or listing request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for `connected()` probes, so engine sync never stalls on an
/// unreachable host.
pub(crate) const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Build the shared, connection-pooled HTTP client.
pub(crate) fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            error!(error = %e, "failed to configure HTTP client, using defaults");
            reqwest::Client::new()
        })
}

/// Resolve the API base: engine option > spec default, without a trailing slash.
pub(crate) fn resolve_base(options: &EngineOptions, spec: &ProviderSpec) -> String {
    options
        .url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or(spec.default_api_base)
        .trim_end_matches('/')
        .to_string()
}

/// Send a request and decode a JSON body, mapping every failure to
/// [`ProviderError::Call`].
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: &'static str,
    request: RequestBuilder,
) -> Result<T, ProviderError> {
    let response = request.send().await.map_err(|e| {
        error!(provider, error = %e, "HTTP request failed");
        ProviderError::call(provider, e.to_string())
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error body".to_string());
        error!(provider, status = %status, body = %body, "API error");
        return Err(ProviderError::status(provider, status.as_u16(), body));
    }

    response.json::<T>().await.map_err(|e| {
        error!(provider, error = %e, "Failed to parse provider response");
        ProviderError::call(provider, format!("invalid response body: {e}"))
    })
}

/// Cheapest live check: any 2xx within [`PROBE_TIMEOUT`] counts as connected.
pub(crate) async fn probe(provider: &'static str, request: RequestBuilder) -> bool {
    match request.timeout(PROBE_TIMEOUT).send().await {
        Ok(resp) if resp.status().is_success() => true,
        Ok(resp) => {
            debug!(provider, status = %resp.status(), "connectivity probe rejected");
            false
        }
        Err(e) => {
            debug!(provider, error = %e, "connectivity probe failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{find_by_name, ProviderKind};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options(url: Option<&str>) -> EngineOptions {
        EngineOptions {
            api_key: String::new(),
            url: url.map(String::from),
        }
    }

    #[test]
    fn test_resolve_base_trailing_slash() {
        let spec = find_by_name("openai").unwrap();
        assert_eq!(
            resolve_base(&options(Some("https://proxy.local/v1/")), spec),
            "https://proxy.local/v1"
        );
    }

    #[test]
    fn test_resolve_base_default() {
        let spec = ProviderKind::Ollama.spec();
        assert_eq!(resolve_base(&options(None), spec), "http://localhost:11434");
        assert_eq!(resolve_base(&options(Some("  ")), spec), "http://localhost:11434");
    }

    #[tokio::test]
    async fn test_send_json_maps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/boom"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let client = build_client();
        let err = send_json::<serde_json::Value>("Test", client.get(format!("{}/boom", server.uri())))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(401));
        assert!(err.to_string().contains("bad key"));
    }

    #[tokio::test]
    async fn test_probe_unreachable_is_false() {
        let client = build_client();
        assert!(!probe("Test", client.get("http://127.0.0.1:1/")).await);
    }

    #[tokio::test]
    async fn test_probe_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = build_client();
        assert!(probe("Test", client.get(format!("{}/ok", server.uri()))).await);
    }
}
