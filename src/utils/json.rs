use crate::core::error::{Result, StoryError};
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// What to do when a model reply cannot be parsed as the JSON we asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Substitute a fixed placeholder value and keep going.
    #[default]
    Placeholder,
    /// Surface the parse failure as [`StoryError::MalformedResponse`].
    Error,
}

/// Removes a leading "```json" or "```" fence and a trailing "```" fence.
pub fn strip_code_blocks(s: &str) -> String {
    let s = s.trim();
    let s = s
        .strip_prefix("```json")
        .or_else(|| s.strip_prefix("```"))
        .unwrap_or(s);
    let s = s.strip_suffix("```").unwrap_or(s);
    s.trim().to_string()
}

pub fn parse_model_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let clean = strip_code_blocks(raw);
    serde_json::from_str(&clean).map_err(|e| {
        StoryError::MalformedResponse(format!("{}. Body: {}", e, truncate(&clean, 200)))
    })
}

/// Applies `policy` to a parse result: placeholders replace only
/// malformed-response failures, everything else is passed through.
pub fn with_fallback<T>(
    parsed: Result<T>,
    policy: FallbackPolicy,
    what: &str,
    placeholder: impl FnOnce() -> T,
) -> Result<T> {
    match parsed {
        Err(StoryError::MalformedResponse(msg)) if policy == FallbackPolicy::Placeholder => {
            warn!("Could not parse {} ({}), using placeholder", what, msg);
            Ok(placeholder())
        }
        other => other,
    }
}

pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}
