//! Application settings persistence using dconf
//!
//! Settings are stored in dconf under `/com/wordcoach/flashcards/`

use crate::models::Settings;
use log::error;

const DCONF_PATH: &str = "/com/wordcoach/flashcards/";

/// Keys for dconf settings
mod keys {
    pub const TEXT_MODEL: &str = "text-model";
    pub const SPEECH_MODEL: &str = "speech-model";
    pub const VOICE_NAME: &str = "voice-name";
    pub const FEEDBACK_LANGUAGE: &str = "feedback-language";
}

fn get_string(key: &str) -> Option<String> {
    let key = format!("{}{}", DCONF_PATH, key);
    dconf_rs::get_string(&key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn set_string(key: &str, value: &str) {
    let path = format!("{}{}", DCONF_PATH, key);
    if let Err(e) = dconf_rs::set_string(&path, value) {
        error!("Failed to save {} to dconf: {}", key, e);
    }
}

/// Load settings, using defaults for anything unset
pub fn load() -> Settings {
    let defaults = Settings::default();
    Settings {
        text_model: get_string(keys::TEXT_MODEL).unwrap_or(defaults.text_model),
        speech_model: get_string(keys::SPEECH_MODEL).unwrap_or(defaults.speech_model),
        voice_name: get_string(keys::VOICE_NAME).unwrap_or(defaults.voice_name),
        feedback_language: get_string(keys::FEEDBACK_LANGUAGE)
            .unwrap_or(defaults.feedback_language),
    }
}

/// Set the model used for word details and grading
pub fn set_text_model(model: &str) {
    set_string(keys::TEXT_MODEL, model);
}

/// Set the speech synthesis model
pub fn set_speech_model(model: &str) {
    set_string(keys::SPEECH_MODEL, model);
}

/// Set the prebuilt voice used for pronunciation playback
pub fn set_voice_name(voice: &str) {
    set_string(keys::VOICE_NAME, voice);
}

/// Set the language feedback is written in
pub fn set_feedback_language(language: &str) {
    set_string(keys::FEEDBACK_LANGUAGE, language);
}
