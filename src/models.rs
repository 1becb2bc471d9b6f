use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A vocabulary card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    pub id: String,
    pub text: String,
    pub phonetic: String,
    pub definition: String,
    pub example: String,
    /// Last pronunciation score, 0-100
    pub mastery_level: u8,
    /// Unix milliseconds of the last graded attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_practiced: Option<i64>,
}

impl Word {
    /// Build a new card from generated details, filling in gaps
    pub fn from_details(text: &str, details: WordDetails) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            phonetic: non_empty_or(details.phonetic, "N/A"),
            definition: non_empty_or(details.definition, "Custom word"),
            example: details.example.trim().to_string(),
            mastery_level: 0,
            last_practiced: None,
        }
    }

    fn preset(id: &str, text: &str, phonetic: &str, definition: &str, example: &str) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
            phonetic: phonetic.to_string(),
            definition: definition.to_string(),
            example: example.to_string(),
            mastery_level: 0,
            last_practiced: None,
        }
    }
}

fn non_empty_or(value: String, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Generated details for a word the learner typed in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordDetails {
    #[serde(default)]
    pub phonetic: String,
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub example: String,
}

/// Graded pronunciation attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub score: u8,
    pub feedback: String,
    /// Specific phoneme correction
    pub suggestion: String,
    pub encouragement: String,
}

impl EvaluationResult {
    pub fn is_good(&self) -> bool {
        self.score >= 80
    }
}

/// Collaborator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub text_model: String,
    pub speech_model: String,
    pub voice_name: String,
    pub feedback_language: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            text_model: "gemini-2.5-flash".to_string(),
            speech_model: "gemini-2.5-flash-preview-tts".to_string(),
            voice_name: "Kore".to_string(),
            feedback_language: "Chinese (Simplified)".to_string(),
        }
    }
}

/// Cards available before the learner adds any
pub fn default_words() -> Vec<Word> {
    vec![
        Word::preset(
            "1",
            "Elephant",
            "/ˈɛlɪfənt/",
            "A very large plant-eating mammal with a trunk.",
            "The elephant sprayed water with its trunk.",
        ),
        Word::preset(
            "2",
            "Library",
            "/ˈlaɪbrəri/",
            "A building or room containing collections of books.",
            "We study quietly in the library.",
        ),
        Word::preset(
            "3",
            "Delicious",
            "/dɪˈlɪʃəs/",
            "Highly pleasant to the taste.",
            "This chocolate cake is delicious!",
        ),
        Word::preset(
            "4",
            "Astronaut",
            "/ˈæstrənɔːt/",
            "A person trained to travel in a spacecraft.",
            "The astronaut walked on the moon.",
        ),
        Word::preset(
            "5",
            "Adventure",
            "/ədˈvɛntʃər/",
            "An unusual and exciting or daring experience.",
            "Going camping in the forest was a big adventure.",
        ),
    ]
}
