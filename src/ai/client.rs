//! Gemini REST client

use super::error::AiError;
use super::schema::{
    evaluation_schema, parse_evaluation, parse_word_details, rate_from_mime, word_details_schema,
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part,
};
use super::{AttemptAudio, Collaborator, SpeechAudio, SPEECH_CHANNELS, SPEECH_SAMPLE_RATE};
use crate::models::{EvaluationResult, Settings, WordDetails};
use async_trait::async_trait;
use log::{debug, error, info};
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];
const API_BASE_VAR: &str = "WORDCOACH_API_BASE";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Learner level the generated content is pitched at
const GRADE_LEVEL: &str = "Grade 6 (Elementary School)";

/// Client for the Gemini `generateContent` API
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    settings: Settings,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, settings: Settings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            settings,
        }
    }

    /// Build a client from `GEMINI_API_KEY` (or `API_KEY`) and an optional
    /// `WORDCOACH_API_BASE` override
    pub fn from_env(settings: Settings) -> Result<Self, AiError> {
        let api_key = API_KEY_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| AiError::ApiKeyMissing {
                env_var: API_KEY_VARS[0].to_string(),
            })?;

        let mut client = Self::new(api_key.trim(), settings);
        if let Ok(base) = std::env::var(API_BASE_VAR) {
            client = client.with_base_url(base);
        }
        Ok(client)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, AiError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        info!("Calling {}", model);

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!("Request to {} failed: {}", model, e);
                AiError::Http(e)
            })?;

        let status = response.status();
        debug!("Response status: {}", status);

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("HTTP {} from {}: {}", status, model, message);
            return Err(AiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        debug!(
            "Response body: {}",
            body.chars().take(200).collect::<String>()
        );

        serde_json::from_str(&body).map_err(|e| {
            error!("Failed to parse response from {}: {}", model, e);
            AiError::InvalidResponseShape(e.to_string())
        })
    }
}

fn single_turn(parts: Vec<Part>, config: GenerationConfig) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content { parts }],
        generation_config: Some(config),
    }
}

#[async_trait]
impl Collaborator for GeminiClient {
    async fn word_details(&self, text: &str) -> Result<WordDetails, AiError> {
        let prompt = format!(
            "Provide details for the English word \"{}\" suitable for a {} student in China.\n\
             Return JSON format.",
            text, GRADE_LEVEL
        );
        let request = single_turn(
            vec![Part::text(prompt)],
            GenerationConfig::json(word_details_schema()),
        );

        let response = self.generate_content(&self.settings.text_model, &request).await?;
        let text = response.text().ok_or(AiError::EmptyResponse("word details"))?;
        parse_word_details(&text)
    }

    async fn synthesize_speech(&self, text: &str) -> Result<SpeechAudio, AiError> {
        let request = single_turn(
            vec![Part::text(format!("Say the word: {}", text))],
            GenerationConfig::speech(&self.settings.voice_name),
        );

        let response = self
            .generate_content(&self.settings.speech_model, &request)
            .await?;
        let inline = response
            .inline_data()
            .filter(|d| !d.data.is_empty())
            .ok_or(AiError::EmptyResponse("speech audio"))?;

        Ok(SpeechAudio {
            data: inline.data.clone(),
            sample_rate: rate_from_mime(&inline.mime_type).unwrap_or(SPEECH_SAMPLE_RATE),
            channels: SPEECH_CHANNELS,
        })
    }

    async fn evaluate_pronunciation(
        &self,
        audio: &AttemptAudio,
        target_word: &str,
    ) -> Result<EvaluationResult, AiError> {
        let language = &self.settings.feedback_language;
        let prompt = format!(
            "You are a friendly English teacher for primary school students.\n\
             Listen to the attached audio. The student is trying to say the word \"{word}\".\n\
             \n\
             1. Score their pronunciation from 0 to 100. Be encouraging but realistic.\n\
             2. Provide feedback in {language}.\n\
             3. Identify if any specific part was unclear (Suggestion).\n\
             4. Give a short cheerful encouraging phrase in {language}.",
            word = target_word,
            language = language,
        );
        let request = single_turn(
            vec![
                Part::inline(audio.mime_type.clone(), audio.data.clone()),
                Part::text(prompt),
            ],
            GenerationConfig::json(evaluation_schema(language)),
        );

        let response = self.generate_content(&self.settings.text_model, &request).await?;
        let text = response.text().ok_or(AiError::EmptyResponse("evaluation"))?;
        parse_evaluation(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn text_response(text: &str) -> serde_json::Value {
        json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
    }

    async fn client_for(server: &MockServer) -> GeminiClient {
        GeminiClient::new("test-key", Settings::default()).with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_word_details() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "generationConfig": { "responseMimeType": "application/json" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response(
                r#"{"phonetic": "/ˈɡæləksi/", "definition": "A huge group of stars.", "example": "We live in the Milky Way galaxy."}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let details = client_for(&server).await.word_details("Galaxy").await.unwrap();
        assert_eq!(details.definition, "A huge group of stars.");
    }

    #[tokio::test]
    async fn test_evaluation_sends_audio() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .and(body_partial_json(json!({
                "contents": [{ "parts": [{ "inlineData": { "mimeType": "audio/wav", "data": "UklGRg==" } }] }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response(
                r#"{"score": 76, "feedback": "很好", "suggestion": "重读第一个音节", "encouragement": "继续加油!"}"#,
            )))
            .mount(&server)
            .await;

        let audio = AttemptAudio {
            data: "UklGRg==".to_string(),
            mime_type: "audio/wav".to_string(),
        };
        let result = client_for(&server)
            .await
            .evaluate_pronunciation(&audio, "Library")
            .await
            .unwrap();
        assert_eq!(result.score, 76);
        assert!(!result.is_good());
    }

    #[tokio::test]
    async fn test_out_of_range_score_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response(
                r#"{"score": 140, "feedback": "", "suggestion": "", "encouragement": ""}"#,
            )))
            .mount(&server)
            .await;

        let audio = AttemptAudio {
            data: "AA==".to_string(),
            mime_type: "audio/wav".to_string(),
        };
        let err = client_for(&server)
            .await
            .evaluate_pronunciation(&audio, "Library")
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::InvalidResponseShape(_)));
    }

    #[tokio::test]
    async fn test_speech() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash-preview-tts:generateContent"))
            .and(body_partial_json(json!({
                "generationConfig": {
                    "responseModalities": ["AUDIO"],
                    "speechConfig": { "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": "Kore" } } }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{
                    "inlineData": { "mimeType": "audio/L16;codec=pcm;rate=24000", "data": "AID/fw==" }
                }] } }]
            })))
            .mount(&server)
            .await;

        let speech = client_for(&server).await.synthesize_speech("Elephant").await.unwrap();
        assert_eq!(speech.data, "AID/fw==");
        assert_eq!(speech.sample_rate, 24000);
        assert_eq!(speech.channels, 1);
    }

    #[tokio::test]
    async fn test_speech_without_audio() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("sorry")))
            .mount(&server)
            .await;

        let err = client_for(&server).await.synthesize_speech("Elephant").await.unwrap_err();
        assert!(matches!(err, AiError::EmptyResponse(_)));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key not valid"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.word_details("Galaxy").await.unwrap_err();
        match err {
            AiError::Api { status, message } => {
                assert_eq!(status, 403);
                assert!(message.contains("not valid"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_envelope_shape_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.word_details("Galaxy").await.unwrap_err();
        assert!(matches!(err, AiError::InvalidResponseShape(_)));
    }
}
