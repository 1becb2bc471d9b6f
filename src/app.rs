//! Application layer: ties the word list, the collaborator and the audio
//! pipeline together behind the CLI commands.

use crate::ai::{AttemptAudio, Collaborator, GeminiClient};
use crate::audio::{
    codec, pcm, AudioOutput, DecodedBuffer, EncodedAudio, FramePolicy, Recorder, WavContainer,
};
use crate::cli::{Args, Command};
use crate::error::{AddWordError, AudioError};
use crate::models::{EvaluationResult, Word};
use crate::settings;
use crate::state::{JsonWordStore, PracticeState, WordStore};
use anyhow::{bail, Context as _, Result};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// Extra time allowed for the output to link and drain after a clip
const PLAYBACK_SLACK: Duration = Duration::from_secs(3);

/// Word list plus the collaborator that grades and enriches it
pub struct Coach {
    state: PracticeState,
    store: Box<dyn WordStore>,
    ai: Arc<dyn Collaborator>,
}

impl Coach {
    pub fn new(store: Box<dyn WordStore>, ai: Arc<dyn Collaborator>) -> Self {
        let words = store.load();
        info!("Loaded {} word(s)", words.len());
        Self {
            state: PracticeState::new(words),
            store,
            ai,
        }
    }

    pub fn state(&self) -> &PracticeState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut PracticeState {
        &mut self.state
    }

    /// Save the current word list
    fn persist(&self) {
        if let Err(e) = self.store.save(self.state.words()) {
            error!("Failed to save word list: {}", e);
        }
    }

    /// Generate details for a new word and append it
    ///
    /// Nothing changes if the collaborator fails.
    pub async fn add_word(&mut self, text: &str) -> Result<Word, AddWordError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AddWordError::EmptyWord);
        }

        let details = self
            .ai
            .word_details(text)
            .await
            .map_err(|source| AddWordError::Details {
                word: text.to_string(),
                source,
            })?;

        let word = Word::from_details(text, details);
        self.state.add_word(word.clone());
        self.persist();
        info!("Added word \"{}\"", text);
        Ok(word)
    }

    /// Grade a recording of the current word and update its mastery
    pub async fn grade_attempt(&mut self, audio: EncodedAudio) -> Result<EvaluationResult> {
        let target = self
            .state
            .current_word()
            .map(|w| w.text.clone())
            .context("No word selected")?;

        let mime_type = audio.mime_type().to_string();
        let data = codec::encode(audio)?;
        let attempt = AttemptAudio { data, mime_type };

        let result = self
            .ai
            .evaluate_pronunciation(&attempt, &target)
            .await
            .context("Failed to grade the recording")?;

        info!("\"{}\" scored {}", target, result.score);
        self.state
            .record_evaluation(result.clone(), chrono::Utc::now().timestamp_millis());
        self.persist();
        Ok(result)
    }

    /// Fetch and decode the reference pronunciation of `text`
    pub async fn pronunciation(&self, text: &str) -> Result<DecodedBuffer> {
        let speech = self
            .ai
            .synthesize_speech(text)
            .await
            .with_context(|| format!("Failed to synthesize \"{}\"", text))?;
        let bytes = codec::base64_to_bytes(&speech.data)?;
        let buffer = pcm::decode(&bytes, speech.sample_rate, speech.channels, FramePolicy::Truncate)?;
        Ok(buffer)
    }

    pub fn next_word(&mut self) {
        self.state.next_word();
    }
}

/// Entry point for every subcommand
pub async fn run(args: Args) -> Result<()> {
    let store: Box<dyn WordStore> = match &args.store {
        Some(path) => Box::new(JsonWordStore::at(path)),
        None => Box::new(JsonWordStore::new()),
    };

    match args.command {
        Command::List => {
            print_word_list(&store.load());
            Ok(())
        }
        Command::Config {
            text_model,
            speech_model,
            voice,
            feedback_language,
        } => {
            configure(text_model, speech_model, voice, feedback_language);
            Ok(())
        }
        Command::Add { word } => {
            let mut coach = Coach::new(store, collaborator()?);
            match coach.add_word(&word).await {
                Ok(word) => {
                    print_card(&word);
                    Ok(())
                }
                Err(AddWordError::EmptyWord) => bail!("{}", AddWordError::EmptyWord),
                Err(e) => {
                    error!("{:#}", anyhow::Error::new(e));
                    bail!("Failed to generate details. Please try again.")
                }
            }
        }
        Command::Say { word } => {
            let coach = Coach::new(store, collaborator()?);
            let text = coach
                .state()
                .find(&word)
                .and_then(|i| coach.state().words().get(i))
                .map(|w| w.text.clone())
                .unwrap_or(word);
            let output = AudioOutput::shared();
            let result = say(&coach, output, &text).await;
            if let Ok(length) = &result {
                let limit = *length + PLAYBACK_SLACK;
                if !output.wait_idle(limit).await {
                    warn!("Playback still running after {:.1}s, stopping", limit.as_secs_f64());
                }
            }
            output.shutdown();
            result.map(|_| ())
        }
        Command::Practice {
            word,
            keep_recordings,
        } => {
            let mut coach = Coach::new(store, collaborator()?);
            if let Some(needle) = word {
                match coach.state().find(&needle) {
                    Some(index) => {
                        coach.state_mut().select(index);
                    }
                    None => warn!("No card matches \"{}\", starting from the first", needle),
                }
            }
            let mut recorder = Recorder::new();
            let keep = keep_recordings.then(|| {
                let config = recorder.config();
                WavContainer::new(config.sample_rate, config.channels)
            });
            let output = AudioOutput::shared();
            let result = practice(&mut coach, &mut recorder, output, keep.as_ref()).await;
            output.shutdown();
            result
        }
    }
}

fn collaborator() -> Result<Arc<dyn Collaborator>> {
    let client = GeminiClient::from_env(settings::load())?;
    Ok(Arc::new(client))
}

fn configure(
    text_model: Option<String>,
    speech_model: Option<String>,
    voice: Option<String>,
    feedback_language: Option<String>,
) {
    if let Some(model) = &text_model {
        settings::set_text_model(model);
    }
    if let Some(model) = &speech_model {
        settings::set_speech_model(model);
    }
    if let Some(voice) = &voice {
        settings::set_voice_name(voice);
    }
    if let Some(language) = &feedback_language {
        settings::set_feedback_language(language);
    }

    let current = settings::load();
    println!("text model:        {}", current.text_model);
    println!("speech model:      {}", current.speech_model);
    println!("voice:             {}", current.voice_name);
    println!("feedback language: {}", current.feedback_language);
}

/// Play the pronunciation of `text`, returning the clip length
async fn say(coach: &Coach, output: &AudioOutput, text: &str) -> Result<Duration> {
    let buffer = match coach.pronunciation(text).await {
        Ok(buffer) => buffer,
        Err(e) => {
            error!("{:#}", e);
            bail!("Could not play audio. Please try again.");
        }
    };
    let length = Duration::from_secs_f64(buffer.duration_seconds());
    info!("Playing {:.2}s of speech", length.as_secs_f64());
    output.play(buffer)?;
    Ok(length)
}

type Input = Lines<BufReader<Stdin>>;

async fn prompt(input: &mut Input, message: &str) -> Result<Option<String>> {
    println!("{}", message);
    Ok(input.next_line().await?)
}

/// Interactive practice loop
async fn practice(
    coach: &mut Coach,
    recorder: &mut Recorder,
    output: &AudioOutput,
    keep: Option<&WavContainer>,
) -> Result<()> {
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let Some(word) = coach.state().current_word().cloned() else {
            println!("No words yet! Add one with `wordcoach add <WORD>`.");
            return Ok(());
        };
        print_card(&word);
        if let Some(result) = coach.state().last_result() {
            print_result(result);
        }

        let Some(line) = prompt(&mut input, "[r]ecord  [l]isten  [n]ext  [q]uit").await? else {
            return Ok(());
        };

        match line.trim().to_lowercase().as_str() {
            "r" | "" => {
                if let Err(e) = record_attempt(coach, recorder, &mut input, keep, &word).await {
                    error!("{:#}", e);
                }
            }
            "l" => {
                if let Err(e) = say(coach, output, &word.text).await {
                    println!("{}", e);
                }
            }
            "n" => coach.next_word(),
            "q" => return Ok(()),
            other => println!("Unknown choice \"{}\"", other),
        }
    }
}

async fn record_attempt(
    coach: &mut Coach,
    recorder: &mut Recorder,
    input: &mut Input,
    keep: Option<&WavContainer>,
    word: &Word,
) -> Result<()> {
    if let Err(e) = recorder.start().await {
        match e {
            AudioError::DeviceUnavailable(_) => {
                println!("Please allow microphone access to practice pronunciation.")
            }
            AudioError::DeviceBusy => println!("The microphone is busy. Try again in a moment."),
            _ => println!("Could not start recording."),
        }
        return Err(e.into());
    }

    // Any line (or end of input) stops the recording
    prompt(input, "Listening... press Enter to stop").await?;
    let Some(audio) = recorder.stop().await? else {
        return Ok(());
    };

    if let Some(container) = keep {
        if !audio.is_empty() {
            match container.save(&audio, &word.text) {
                Ok(path) => info!("Saved attempt to {}", path.display()),
                Err(e) => warn!("Failed to save attempt: {}", e),
            }
        }
    }

    println!("Grading...");
    match coach.grade_attempt(audio).await {
        Ok(_) => Ok(()),
        Err(e) => {
            if matches!(e.downcast_ref::<AudioError>(), Some(AudioError::CodecReadError(_))) {
                println!("Nothing was recorded. Please try again.");
            } else {
                println!("Oops! Something went wrong grading the audio. Try again.");
            }
            Err(e)
        }
    }
}

fn print_card(word: &Word) {
    println!();
    println!("  {}  {}", word.text, word.phonetic);
    println!("  {}", word.definition);
    if !word.example.is_empty() {
        println!("  \"{}\"", word.example);
    }
    println!("  mastery: {}%", word.mastery_level);
    println!();
}

fn print_result(result: &EvaluationResult) {
    let headline = if result.is_good() { "Great job!" } else { "Keep practicing!" };
    println!();
    println!("  {} Score: {}/100", headline, result.score);
    println!("  {}", result.encouragement);
    println!("  Feedback:   {}", result.feedback);
    println!("  Suggestion: {}", result.suggestion);
    println!();
}

fn print_word_list(words: &[Word]) {
    if words.is_empty() {
        println!("No words yet!");
        return;
    }
    let width = words.iter().map(|w| w.text.chars().count()).max().unwrap_or(0);
    for word in words {
        let practiced = word
            .last_practiced
            .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
            .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{:<width$}  {:>3}%  {}  (last practiced: {})",
            word.text,
            word.mastery_level,
            word.phonetic,
            practiced,
            width = width
        );
    }
}
