//! Translation helpers shared by several adapters.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use confab_core::types::{find_tool_call, Arguments, Message, Role};

use crate::error::ProviderError;

/// Concatenate every system message, in order, for providers that carry
/// system content out of band. `None` when the history has no system text.
pub(crate) fn system_prompt(history: &[Message]) -> Option<String> {
    let parts: Vec<&str> = history
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .filter(|c| !c.is_empty())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

/// Name of the tool a result answers, looked up in earlier assistant turns.
pub(crate) fn tool_name_for(history: &[Message], tool_call_id: Option<&str>) -> String {
    tool_call_id
        .and_then(|id| find_tool_call(history, id))
        .map(|tc| tc.function.name.clone())
        .unwrap_or_default()
}

/// Decode string-encoded tool arguments. Blank input is an empty map.
pub(crate) fn parse_arguments(
    provider: &'static str,
    tool: &str,
    raw: &str,
) -> Result<Arguments, ProviderError> {
    if raw.trim().is_empty() {
        return Ok(Arguments::new());
    }
    let value: Value =
        serde_json::from_str(raw).map_err(|e| malformed(provider, tool, e.to_string()))?;
    arguments_from_value(provider, tool, value)
}

/// Accept arguments delivered as an object, as `null`, or double-encoded
/// as a JSON string.
pub(crate) fn arguments_from_value(
    provider: &'static str,
    tool: &str,
    value: Value,
) -> Result<Arguments, ProviderError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Arguments::new()),
        Value::String(raw) => parse_arguments(provider, tool, &raw),
        other => Err(malformed(
            provider,
            tool,
            format!("expected a JSON object, got {other}"),
        )),
    }
}

fn malformed(provider: &'static str, tool: &str, message: String) -> ProviderError {
    ProviderError::MalformedToolArguments {
        provider,
        tool: tool.to_string(),
        message,
    }
}

fn think_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>(.*?)</think>").expect("valid think regex"))
}

/// Split inline `<think>…</think>` spans out of visible text.
///
/// An unclosed `<think>` (a reply cut off mid-reasoning) turns everything
/// after it into reasoning. Returns the remaining text (trimmed) and the
/// joined reasoning, if any.
pub(crate) fn split_think_tags(text: &str) -> (String, Option<String>) {
    const OPEN: &str = "<think>";

    if !text.contains(OPEN) {
        return (text.to_string(), None);
    }

    let re = think_regex();
    let mut thoughts: Vec<String> = re
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let mut visible = re.replace_all(text, "").into_owned();
    if let Some(start) = visible.find(OPEN) {
        let tail = visible[start + OPEN.len()..].trim().to_string();
        if !tail.is_empty() {
            thoughts.push(tail);
        }
        visible.truncate(start);
    }

    let thought = (!thoughts.is_empty()).then(|| thoughts.join("\n"));
    (visible.trim().to_string(), thought)
}

/// Join two optional reasoning fragments.
pub(crate) fn merge_thoughts(a: Option<String>, b: Option<String>) -> Option<String> {
    match (a, b) {
        (Some(a), Some(b)) => Some(format!("{a}\n{b}")),
        (a, b) => a.or(b),
    }
}

/// Strip stray wrapping quotes and leading punctuation some models emit
/// around an otherwise plain reply.
///
/// A wrapping pair is removed only when its quote character does not occur
/// inside the text, so quoted phrases, apostrophes and code fences survive.
pub(crate) fn trim_quote_artifacts(text: &str) -> String {
    const PAIRS: &[(char, char)] = &[('"', '"'), ('\'', '\''), ('\u{201c}', '\u{201d}')];
    // Quotes that may dangle alone at either end; never the apostrophe.
    const LONE: &[char] = &['"', '\u{201c}', '\u{201d}'];

    let mut s = text.trim();
    for _ in 0..2 {
        let unwrapped = PAIRS.iter().find_map(|&(open, close)| {
            let inner = s.strip_prefix(open)?.strip_suffix(close)?;
            (!inner.contains([open, close])).then_some(inner)
        });
        match unwrapped {
            Some(inner) => s = inner.trim(),
            None => break,
        }
    }

    if s.matches(LONE).count() == 1 {
        s = s.strip_prefix(LONE).unwrap_or(s);
        s = s.strip_suffix(LONE).unwrap_or(s);
    }
    s.trim_start_matches([',', ':', ';']).trim().to_string()
}
