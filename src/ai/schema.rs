//! Wire types for the Gemini `generateContent` endpoint and the structured
//! payloads returned for each call.

use super::error::AiError;
use crate::models::{EvaluationResult, WordDetails};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// ============================================================================
// Request
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.into(),
                data: data.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

impl GenerationConfig {
    /// Ask for JSON matching `schema`
    pub fn json(schema: Value) -> Self {
        Self {
            response_mime_type: Some("application/json".to_string()),
            response_schema: Some(schema),
            ..Default::default()
        }
    }

    /// Ask for spoken audio in a prebuilt voice
    pub fn speech(voice_name: &str) -> Self {
        Self {
            response_modalities: Some(vec!["AUDIO".to_string()]),
            speech_config: Some(SpeechConfig {
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig {
                        voice_name: voice_name.to_string(),
                    },
                },
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

// ============================================================================
// Response
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

impl GenerateContentResponse {
    fn first_parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or(&[])
    }

    /// Concatenated text of the first candidate
    pub fn text(&self) -> Option<String> {
        let text: String = self
            .first_parts()
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// First inline binary part of the first candidate
    pub fn inline_data(&self) -> Option<&InlineData> {
        self.first_parts().iter().find_map(|p| p.inline_data.as_ref())
    }
}

// ============================================================================
// Structured payloads
// ============================================================================

pub fn word_details_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "phonetic": { "type": "STRING", "description": "IPA phonetic transcription" },
            "definition": { "type": "STRING", "description": "Simple definition in English" },
            "example": { "type": "STRING", "description": "A simple example sentence using the word" }
        },
        "required": ["phonetic", "definition", "example"]
    })
}

pub fn evaluation_schema(feedback_language: &str) -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "score": { "type": "INTEGER" },
            "feedback": {
                "type": "STRING",
                "description": format!("Constructive feedback in {}", feedback_language)
            },
            "suggestion": {
                "type": "STRING",
                "description": "Specific phoneme advice"
            },
            "encouragement": {
                "type": "STRING",
                "description": format!("Short cheer in {}", feedback_language)
            }
        },
        "required": ["score", "feedback", "suggestion", "encouragement"]
    })
}

#[derive(Debug, Deserialize)]
struct RawEvaluation {
    score: i64,
    feedback: String,
    suggestion: String,
    encouragement: String,
}

fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, AiError> {
    serde_json::from_str(strip_code_fence(text))
        .map_err(|e| AiError::InvalidResponseShape(e.to_string()))
}

/// Models occasionally wrap JSON in a markdown fence
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

pub fn parse_word_details(text: &str) -> Result<WordDetails, AiError> {
    let details: WordDetails = parse_json(text)?;
    if details.phonetic.is_empty() && details.definition.is_empty() && details.example.is_empty() {
        return Err(AiError::InvalidResponseShape(
            "word details have no fields".to_string(),
        ));
    }
    Ok(details)
}

pub fn parse_evaluation(text: &str) -> Result<EvaluationResult, AiError> {
    let raw: RawEvaluation = parse_json(text)?;
    let score = u8::try_from(raw.score)
        .ok()
        .filter(|s| *s <= 100)
        .ok_or_else(|| AiError::InvalidResponseShape(format!("score {} outside 0-100", raw.score)))?;

    Ok(EvaluationResult {
        score,
        feedback: raw.feedback,
        suggestion: raw.suggestion,
        encouragement: raw.encouragement,
    })
}

/// Sample rate advertised in an inline audio mime type such as
/// `audio/L16;codec=pcm;rate=24000`
pub fn rate_from_mime(mime_type: &str) -> Option<u32> {
    mime_type
        .split(';')
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.eq_ignore_ascii_case("rate"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .filter(|rate| *rate > 0)
}
