//! Tool seams — the collaborator the dispatch loop lists and calls tools
//! through, and the trait for tools that run in-process.

use async_trait::async_trait;

use confab_core::types::{Arguments, Session, Tool, ToolParameters};

// ─────────────────────────────────────────────
// ToolServer — what the dispatch loop talks to
// ─────────────────────────────────────────────

/// A source of tools for a session.
///
/// Both calls are opaque to the dispatch loop. An `Err` from
/// `execute_tool` becomes the tool's answer; it never aborts a dispatch.
#[async_trait]
pub trait ToolServer: Send + Sync {
    /// Tool definitions offered to the model for this session.
    async fn list_tools(&self, session: &Session) -> anyhow::Result<Vec<Tool>>;

    /// Run one tool and return its output text.
    async fn execute_tool(
        &self,
        session: &Session,
        name: &str,
        arguments: &Arguments,
    ) -> anyhow::Result<String>;
}

// ─────────────────────────────────────────────
// LocalTool — an in-process tool
// ─────────────────────────────────────────────

/// A tool implemented in Rust and held by a [`super::ToolRegistry`].
#[async_trait]
pub trait LocalTool: Send + Sync {
    /// Unique name used by the model to call this tool (e.g. `"get_weather"`).
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// Parameter schema.
    fn parameters(&self) -> ToolParameters;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: &Arguments) -> anyhow::Result<String>;

    /// Build the canonical definition sent to the model.
    fn to_definition(&self) -> Tool {
        Tool::new(self.name(), self.description(), self.parameters())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Shout;

    #[async_trait]
    impl LocalTool for Shout {
        fn name(&self) -> &str {
            "shout"
        }
        fn description(&self) -> &str {
            "Upper-cases text"
        }
        fn parameters(&self) -> ToolParameters {
            ToolParameters::default()
                .property("text", "string", "Text to shout")
                .require("text")
        }
        async fn execute(&self, arguments: &Arguments) -> anyhow::Result<String> {
            let text = arguments
                .get("text")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow::anyhow!("Missing required parameter: text"))?;
            Ok(text.to_uppercase())
        }
    }

    #[test]
    fn test_to_definition() {
        let def = Shout.to_definition();
        assert_eq!(def.name, "shout");
        assert_eq!(def.parameters.required, vec!["text".to_string()]);
        assert_eq!(
            def.parameters.properties["text"].kind.as_deref(),
            Some("string")
        );
    }

    #[tokio::test]
    async fn test_execute_missing_param() {
        let err = Shout.execute(&Arguments::new()).await.unwrap_err();
        assert!(err.to_string().contains("text"));

        let mut args = Arguments::new();
        args.insert("text".into(), json!("hi"));
        assert_eq!(Shout.execute(&args).await.unwrap(), "HI");
    }
}
