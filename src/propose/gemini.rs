//! Gemini `generateContent` proposer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Segment, SegmentProposer};
use crate::error::ProposerError;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-flash-latest";
/// Transcript characters sent with the prompt
pub const MAX_TRANSCRIPT_CHARS: usize = 90_000;

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: String,
}

/// Models sometimes answer with a bare object instead of a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<Segment>),
    One(Segment),
}

pub struct GeminiProposer {
    api_key: String,
    model: String,
    max_segments: usize,
    client: reqwest::blocking::Client,
}

impl GeminiProposer {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ProposerError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ProposerError::MissingApiKey);
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(180))
            .build()?;
        Ok(Self {
            api_key,
            model: model.into(),
            max_segments: 3,
            client,
        })
    }

    /// Key from `GEMINI_API_KEY`.
    pub fn from_env(model: impl Into<String>) -> Result<Self, ProposerError> {
        let key = std::env::var("GEMINI_API_KEY").map_err(|_| ProposerError::MissingApiKey)?;
        Self::new(key, model)
    }

    pub fn with_max_segments(mut self, max_segments: usize) -> Self {
        self.max_segments = max_segments.max(1);
        self
    }

    fn request(&self, prompt: String) -> Result<String, ProposerError> {
        let url = format!("{}/{}:generateContent", API_BASE, self.model);
        let body = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ProposerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GeminiResponse = response.json()?;
        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or(ProposerError::EmptyResponse)
    }
}

impl SegmentProposer for GeminiProposer {
    fn name(&self) -> &str {
        "gemini"
    }

    fn propose(&self, transcript: &str) -> Result<Vec<Segment>, ProposerError> {
        log::info!(
            "Asking {} for the top {} segments ({} transcript chars)",
            self.model,
            self.max_segments,
            transcript.chars().count()
        );
        let text = self.request(build_prompt(transcript, self.max_segments))?;
        parse_segments(&text)
    }
}

pub fn build_prompt(transcript: &str, max_segments: usize) -> String {
    format!(
        r#"I have a transcript of a long-form video. Identify the TOP {max_segments} most viral, interesting, or high-value segments to turn into vertical short clips.

RULES:
1. Each segment must be between 30 and 60 seconds.
2. Segments must not overlap.
3. Write a CLICKBAIT HEADLINE (max 5 words) for each.

TRANSCRIPT:
"{transcript}"

Output strictly as a JSON LIST of objects:
[
    {{
        "start_time": 120.5,
        "end_time": 180.0,
        "headline": "THE HIDDEN TRUTH 🤫",
        "reason": "High emotional impact"
    }}
]
"#,
        max_segments = max_segments,
        transcript = truncate_chars(transcript, MAX_TRANSCRIPT_CHARS),
    )
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Parse a model answer, tolerating a surrounding markdown code fence.
pub fn parse_segments(text: &str) -> Result<Vec<Segment>, ProposerError> {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);

    Ok(match serde_json::from_str::<OneOrMany>(text.trim())? {
        OneOrMany::Many(segments) => segments,
        OneOrMany::One(segment) => vec![segment],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list() {
        let segments = parse_segments(
            r#"[{"start_time": 120.5, "end_time": 180.0, "headline": "THE HIDDEN TRUTH", "reason": "r"},
                {"start_time": 500, "end_time": 560, "headline": "STOP", "reason": "s"}]"#,
        )
        .unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start_time, 120.5);
        assert_eq!(segments[1].headline, "STOP");
    }

    #[test]
    fn wraps_single_object() {
        let segments =
            parse_segments(r#"{"start_time": 1, "end_time": 40, "headline": "ONE"}"#).unwrap();
        assert_eq!(segments, vec![Segment::new(1.0, 40.0, "ONE", "")]);
    }

    #[test]
    fn strips_code_fences() {
        let text = "```json\n[{\"start_time\": 0, \"end_time\": 30, \"headline\": \"H\", \"reason\": \"R\"}]\n```";
        assert_eq!(parse_segments(text).unwrap().len(), 1);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            parse_segments("Sorry, I can't help with that."),
            Err(ProposerError::Parse(_))
        ));
    }

    #[test]
    fn prompt_caps_transcript() {
        let transcript = "é".repeat(MAX_TRANSCRIPT_CHARS + 500);
        let prompt = build_prompt(&transcript, 3);
        assert!(prompt.contains("TOP 3"));
        let quoted = prompt.chars().filter(|&c| c == 'é').count();
        assert_eq!(quoted, MAX_TRANSCRIPT_CHARS);
    }

    #[test]
    fn blank_key_is_rejected() {
        assert!(matches!(
            GeminiProposer::new("  ", DEFAULT_MODEL),
            Err(ProposerError::MissingApiKey)
        ));
    }
}
