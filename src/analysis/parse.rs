use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::{
    AnalysisError, Confidence, NutritionEstimate, DEFAULT_DESCRIPTION, DEFAULT_PORTIONS,
    DEFAULT_SOURCES,
};

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

/// Pull the assistant text out of a 2xx chat-completions body.
pub fn extract_content(body: &str) -> Result<String, AnalysisError> {
    let malformed = || AnalysisError::MalformedResponse {
        raw: body.to_string(),
    };
    let parsed: ChatCompletionResponse = serde_json::from_str(body).map_err(|_| malformed())?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(malformed)
}

/// `error.message` of an upstream error body, if it has one.
pub fn upstream_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error.message)
        .filter(|m| !m.trim().is_empty())
}

pub fn strip_code_fences(content: &str) -> String {
    lazy_static! {
        static ref FENCE_RE: Regex = Regex::new(r"```(?:json)?\n?").unwrap();
    }
    FENCE_RE.replace_all(content, "").trim().to_string()
}

/// Validate the model's JSON and fill in defaults for optional fields.
pub fn normalize(content: &str) -> Result<NutritionEstimate, AnalysisError> {
    let cleaned = strip_code_fences(content);
    let value: Value = serde_json::from_str(&cleaned).map_err(|_| {
        AnalysisError::MalformedResponse {
            raw: content.to_string(),
        }
    })?;

    let incomplete = || AnalysisError::IncompleteResult {
        raw: content.to_string(),
    };
    let calories = value
        .get("calories")
        .and_then(Value::as_f64)
        .map(f64::round)
        .filter(|c| (0.0..=f64::from(u32::MAX)).contains(c))
        .ok_or_else(incomplete)?;

    let text = |key: &str, default: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(default)
            .to_string()
    };

    let foods = value
        .get("foods")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let confidence = value
        .get("confidence")
        .and_then(Value::as_str)
        .map(Confidence::from_label)
        .unwrap_or_default();

    Ok(NutritionEstimate {
        calories: calories as u32,
        description: text("description", DEFAULT_DESCRIPTION),
        foods,
        portions: text("portions", DEFAULT_PORTIONS),
        confidence,
        sources: text("sources", DEFAULT_SOURCES),
    })
}
