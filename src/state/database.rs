//! JSON-based storage for the word list
//!
//! Words live under the fixed key `lse_words`, which maps to
//! ~/.local/share/wordcoach/lse_words.json for the file-backed store.

use crate::error::StoreError;
use crate::models::{default_words, Word};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::Mutex;

/// Storage key for the persisted word list
pub const STORAGE_KEY: &str = "lse_words";

/// Persistence backend for the word list
pub trait WordStore: Send {
    /// Load the word list, falling back to the built-in cards if nothing
    /// usable is stored
    fn load(&self) -> Vec<Word>;

    /// Replace the stored word list
    fn save(&self, words: &[Word]) -> Result<(), StoreError>;
}

impl<S: WordStore + Sync + ?Sized> WordStore for std::sync::Arc<S> {
    fn load(&self) -> Vec<Word> {
        (**self).load()
    }

    fn save(&self, words: &[Word]) -> Result<(), StoreError> {
        (**self).save(words)
    }
}

/// Parse stored JSON, or fall back to the defaults
fn parse_or_default(contents: Option<&str>) -> Vec<Word> {
    let Some(contents) = contents else {
        debug!("No stored words, using defaults");
        return default_words();
    };

    match serde_json::from_str(contents) {
        Ok(words) => words,
        Err(e) => {
            warn!("Stored word list is unreadable, using defaults: {}", e);
            default_words()
        }
    }
}

/// Word store backed by a JSON file
pub struct JsonWordStore {
    path: PathBuf,
}

impl JsonWordStore {
    /// Create a store at the default location
    pub fn new() -> Self {
        Self {
            path: Self::default_path(),
        }
    }

    /// Create a store at an explicit path
    pub fn at(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wordcoach")
            .join(format!("{}.json", STORAGE_KEY))
    }

    fn ensure_dir(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl Default for JsonWordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WordStore for JsonWordStore {
    fn load(&self) -> Vec<Word> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => parse_or_default(Some(&contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => parse_or_default(None),
            Err(e) => {
                warn!("Failed to read {}: {}", self.path.display(), e);
                parse_or_default(None)
            }
        }
    }

    fn save(&self, words: &[Word]) -> Result<(), StoreError> {
        self.ensure_dir()?;
        let contents = serde_json::to_string(words)?;
        fs::write(&self.path, contents)?;
        debug!("Saved {} words to {}", words.len(), self.path.display());
        Ok(())
    }
}

/// In-memory store holding the serialized list, like a key-value slot
#[cfg(test)]
#[derive(Default)]
pub struct MemoryWordStore {
    slot: Mutex<Option<String>>,
}

#[cfg(test)]
impl MemoryWordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the slot with raw contents
    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(contents.into())),
        }
    }

    pub fn contents(&self) -> Option<String> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
impl WordStore for MemoryWordStore {
    fn load(&self) -> Vec<Word> {
        parse_or_default(self.contents().as_deref())
    }

    fn save(&self, words: &[Word]) -> Result<(), StoreError> {
        let contents = serde_json::to_string(words)?;
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(contents);
        Ok(())
    }
}
