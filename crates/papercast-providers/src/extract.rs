//! Structured data extraction from free-form model output.
//!
//! Models wrap JSON in markdown fences, prefix it with chatter, or append
//! explanations. Extraction runs an ordered list of [`ExtractionStrategy`]s and
//! takes the first candidate that parses as a JSON object.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use papercast_core::types::{ExtractedPayload, Question};

const FENCE: &str = "```";

/// Model output could not be turned into the expected structure.
#[derive(Debug, Clone, Error)]
#[error("could not extract JSON from model response: {reason}")]
pub struct ExtractionError {
    /// The unmodified model response, for diagnosis.
    pub raw: String,
    pub reason: String,
}

/// A way of locating a JSON candidate inside model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Contents of the first triple-backtick block, with any language tag dropped.
    FencedBlock,
    /// The first brace-balanced `{...}` span.
    BraceSpan,
}

impl ExtractionStrategy {
    /// Strategies in the order they are attempted.
    pub const ORDER: [ExtractionStrategy; 2] =
        [ExtractionStrategy::FencedBlock, ExtractionStrategy::BraceSpan];

    /// Locate this strategy's candidate text, if any.
    pub fn candidate<'a>(&self, raw: &'a str) -> Option<&'a str> {
        match self {
            Self::FencedBlock => fenced_block(raw),
            Self::BraceSpan => balanced_object(raw),
        }
    }
}

/// Inner text of the first fenced code block.
///
/// The opening fence may carry a tag (` ```json `); a missing closing fence
/// takes the rest of the input.
fn fenced_block(raw: &str) -> Option<&str> {
    let open = raw.find(FENCE)?;
    let after_open = &raw[open + FENCE.len()..];

    // Skip the info string up to the end of the fence line. A one-line fence
    // (```{...}```) has no newline before the closing marker.
    let body = match after_open.find('\n') {
        Some(nl) if !after_open[..nl].contains(FENCE) => &after_open[nl + 1..],
        _ => after_open.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };

    let inner = match body.find(FENCE) {
        Some(close) => &body[..close],
        None => body,
    };
    let inner = inner.trim();
    (!inner.is_empty()).then_some(inner)
}

/// The first `{...}` span whose braces balance, ignoring braces inside JSON
/// string literals. An opening brace that never closes is skipped.
fn balanced_object(raw: &str) -> Option<&str> {
    let mut from = 0;
    while let Some(found) = raw[from..].find('{') {
        let start = from + found;
        if let Some(len) = balanced_len(&raw[start..]) {
            return Some(&raw[start..start + len]);
        }
        from = start + 1;
    }
    None
}

/// Byte length of the balanced object opening at the start of `text`.
fn balanced_len(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Find the first JSON object in `raw`, reporting which strategy produced it.
pub fn extract_json_object(
    raw: &str,
) -> Result<(ExtractionStrategy, Map<String, Value>), ExtractionError> {
    let mut last_reason = None;

    for strategy in ExtractionStrategy::ORDER {
        let Some(candidate) = strategy.candidate(raw) else {
            continue;
        };
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(map)) => return Ok((strategy, map)),
            Ok(other) => {
                last_reason = Some(format!(
                    "{strategy:?} candidate is JSON {} rather than an object",
                    json_kind(&other)
                ));
            }
            Err(e) => last_reason = Some(format!("{strategy:?} candidate is not valid JSON: {e}")),
        }
    }

    Err(ExtractionError {
        raw: raw.to_string(),
        reason: last_reason.unwrap_or_else(|| "no JSON object found".to_string()),
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Deserialize an optional field of an extracted object.
fn field<T: DeserializeOwned>(
    raw: &str,
    map: &mut Map<String, Value>,
    key: &str,
) -> Result<Option<T>, ExtractionError> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| ExtractionError {
                raw: raw.to_string(),
                reason: format!("`{key}` has an unexpected shape: {e}"),
            }),
    }
}

/// Recover calibration questions from a question-generation response.
///
/// A well-formed object without a `questions` key yields an empty list.
pub fn extract_questions(raw: &str) -> Result<ExtractedPayload, ExtractionError> {
    let (_, mut map) = extract_json_object(raw)?;
    let questions: Vec<Question> = field(raw, &mut map, "questions")?.unwrap_or_default();
    Ok(ExtractedPayload { questions })
}

/// A generated podcast script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptPayload {
    pub title: Option<String>,
    pub script: String,
}

/// Recover the podcast script from a script-generation response.
///
/// Unlike questions, the script is mandatory: a missing or blank `script` is an error.
pub fn extract_script(raw: &str) -> Result<ScriptPayload, ExtractionError> {
    let (_, mut map) = extract_json_object(raw)?;
    let title: Option<String> = field(raw, &mut map, "title")?;
    let script: Option<String> = field(raw, &mut map, "script")?;

    match script {
        Some(script) if !script.trim().is_empty() => Ok(ScriptPayload {
            title: title.filter(|t| !t.trim().is_empty()),
            script: script.trim().to_string(),
        }),
        _ => Err(ExtractionError {
            raw: raw.to_string(),
            reason: "response has no `script` text".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_json_with_prose() {
        let raw = "Sure! ```json\n{\"questions\":[{\"prompt\":\"P\",\"options\":[\"a\"]}]}\n```";
        let payload = extract_questions(raw).unwrap();
        assert_eq!(
            payload.questions,
            vec![Question {
                prompt: "P".into(),
                options: vec!["a".into()],
            }]
        );
    }

    #[test]
    fn test_no_json_is_error() {
        let err = extract_questions("no json here").unwrap_err();
        assert_eq!(err.raw, "no json here");
        assert_eq!(err.reason, "no JSON object found");
    }

    #[test]
    fn test_missing_questions_key_is_empty() {
        let payload = extract_questions(r#"{"answer": 42}"#).unwrap();
        assert!(payload.questions.is_empty());
    }

    #[test]
    fn test_malformed_questions_is_error() {
        let err = extract_questions(r#"{"questions": "five of them"}"#).unwrap_err();
        assert!(err.reason.contains("questions"));
    }

    #[test]
    fn test_nested_braces_are_not_truncated() {
        let raw = r#"Here you go: {"questions": [{"prompt": "Nested?", "options": ["a"], "meta": {"depth": {"level": 2}}}]} Let me know if you need more."#;
        let (strategy, map) = extract_json_object(raw).unwrap();
        assert_eq!(strategy, ExtractionStrategy::BraceSpan);
        assert_eq!(map["questions"][0]["meta"]["depth"]["level"], 2);
        let payload = extract_questions(raw).unwrap();
        assert_eq!(payload.questions[0].prompt, "Nested?");
    }

    #[test]
    fn test_braces_inside_strings() {
        let raw = r#"{"questions": [{"prompt": "What does `}` close? And \"{\"?", "options": []}]} trailing }"#;
        let payload = extract_questions(raw).unwrap();
        assert_eq!(payload.questions[0].prompt, r#"What does `}` close? And "{"?"#);
    }

    #[test]
    fn test_only_first_span_considered() {
        let raw = r#"First {"questions": [{"prompt": "one"}]} then {"questions": [{"prompt": "two"}]}"#;
        let payload = extract_questions(raw).unwrap();
        assert_eq!(payload.questions.len(), 1);
        assert_eq!(payload.questions[0].prompt, "one");
    }

    #[test]
    fn test_greedy_match_would_fail() {
        // `\{.*\}` would swallow both objects and the prose between them.
        let raw = r#"{"questions": []} and also {"unrelated": true}"#;
        assert_eq!(balanced_object(raw), Some(r#"{"questions": []}"#));
    }

    #[test]
    fn test_unbalanced_object_is_error() {
        let err = extract_questions(r#"{"questions": [{"prompt": "cut off"#).unwrap_err();
        assert_eq!(err.reason, "no JSON object found");
    }

    #[test]
    fn test_unclosed_prose_brace_is_skipped() {
        let raw = r#"Use a set {a, b. Here: {"questions": [{"prompt": "P"}]}"#;
        assert_eq!(balanced_object(raw), Some(r#"{"questions": [{"prompt": "P"}]}"#));
        let payload = extract_questions(raw).unwrap();
        assert_eq!(payload.questions.len(), 1);
        assert_eq!(payload.questions[0].prompt, "P");

        // Still only the first balanced span.
        let raw = r#"{ oops {"questions": [{"prompt": "one"}]} {"questions": []}"#;
        assert_eq!(extract_questions(raw).unwrap().questions[0].prompt, "one");
    }

    #[test]
    fn test_question_with_both_text_keys() {
        let raw = r#"{"questions": [{"q": "Q1", "prompt": "Do you know attention?", "options": ["yes"]}]}"#;
        let payload = extract_questions(raw).unwrap();
        assert_eq!(payload.questions[0].prompt, "Do you know attention?");
    }

    #[test]
    fn test_untagged_fence() {
        let raw = "```\n{\"questions\": [{\"q\": \"Legacy key\", \"options\": [\"x\", \"y\"]}]}\n```";
        let (strategy, _) = extract_json_object(raw).unwrap();
        assert_eq!(strategy, ExtractionStrategy::FencedBlock);
        assert_eq!(extract_questions(raw).unwrap().questions[0].prompt, "Legacy key");
    }

    #[test]
    fn test_unclosed_fence_takes_rest() {
        let raw = "```json\n{\"questions\": []}\n";
        assert_eq!(fenced_block(raw), Some("{\"questions\": []}"));
    }

    #[test]
    fn test_single_line_fence() {
        assert_eq!(fenced_block("```json{\"a\": 1}```"), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_bad_fence_falls_back_to_brace_span() {
        let raw = "```text\nnot json\n```\nActual: {\"questions\": [{\"prompt\": \"ok\"}]}";
        let (strategy, _) = extract_json_object(raw).unwrap();
        assert_eq!(strategy, ExtractionStrategy::BraceSpan);
    }

    #[test]
    fn test_array_candidate_reports_kind() {
        let err = extract_json_object("```json\n[1, 2]\n```").unwrap_err();
        assert!(err.reason.contains("array"), "{}", err.reason);
    }

    #[test]
    fn test_invalid_json_reason_mentions_parse_failure() {
        let err = extract_json_object("{not: valid}").unwrap_err();
        assert!(err.reason.contains("not valid JSON"), "{}", err.reason);
    }

    #[test]
    fn test_extract_script() {
        let raw = "```json\n{\"title\": \"Attention, Explained\", \"script\": \"  Welcome back. Today we read a paper.  \"}\n```";
        let script = extract_script(raw).unwrap();
        assert_eq!(script.title.as_deref(), Some("Attention, Explained"));
        assert_eq!(script.script, "Welcome back. Today we read a paper.");
    }

    #[test]
    fn test_extract_script_requires_text() {
        assert!(extract_script(r#"{"title": "Empty", "script": "   "}"#).is_err());
        assert!(extract_script(r#"{"title": "Missing"}"#).is_err());
    }
}
