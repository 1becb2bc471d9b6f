use crate::models::{EvaluationResult, Word};

/// In-memory practice session over the word list
#[derive(Debug, Clone, Default)]
pub struct PracticeState {
    words: Vec<Word>,
    current_index: usize,
    last_result: Option<EvaluationResult>,
}

impl PracticeState {
    pub fn new(words: Vec<Word>) -> Self {
        Self {
            words,
            current_index: 0,
            last_result: None,
        }
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// The card being practiced, if there are any cards
    pub fn current_word(&self) -> Option<&Word> {
        self.words.get(self.current_index)
    }

    pub fn last_result(&self) -> Option<&EvaluationResult> {
        self.last_result.as_ref()
    }

    /// Move to the next card, wrapping around
    pub fn next_word(&mut self) {
        self.last_result = None;
        if self.words.is_empty() {
            return;
        }
        self.current_index = (self.current_index + 1) % self.words.len();
    }

    /// Jump to a card by index
    pub fn select(&mut self, index: usize) -> bool {
        if index < self.words.len() {
            self.current_index = index;
            self.last_result = None;
            true
        } else {
            false
        }
    }

    /// Find a card by id or by case-insensitive text
    pub fn find(&self, needle: &str) -> Option<usize> {
        let needle = needle.trim();
        self.words
            .iter()
            .position(|w| w.id == needle || w.text.eq_ignore_ascii_case(needle))
    }

    /// Append a card and make it current
    pub fn add_word(&mut self, word: Word) {
        self.words.push(word);
        self.current_index = self.words.len() - 1;
        self.last_result = None;
    }

    /// Store a graded attempt against the current card
    pub fn record_evaluation(&mut self, result: EvaluationResult, now_ms: i64) {
        if let Some(word) = self.words.get_mut(self.current_index) {
            word.mastery_level = result.score.min(100);
            word.last_practiced = Some(now_ms);
        }
        self.last_result = Some(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::default_words;

    fn result(score: u8) -> EvaluationResult {
        EvaluationResult {
            score,
            feedback: "不错".to_string(),
            suggestion: "stress the first syllable".to_string(),
            encouragement: "加油!".to_string(),
        }
    }

    #[test]
    fn test_next_word_wraps() {
        let mut state = PracticeState::new(default_words());
        for _ in 0..4 {
            state.next_word();
        }
        assert_eq!(state.current_word().unwrap().text, "Adventure");
        state.next_word();
        assert_eq!(state.current_index(), 0);
    }

    #[test]
    fn test_empty_list() {
        let mut state = PracticeState::new(Vec::new());
        state.next_word();
        assert!(state.current_word().is_none());
        state.record_evaluation(result(50), 1);
        assert_eq!(state.last_result().unwrap().score, 50);
    }

    #[test]
    fn test_record_evaluation_updates_current() {
        let mut state = PracticeState::new(default_words());
        state.next_word();
        state.record_evaluation(result(88), 1_234);

        let word = state.current_word().unwrap();
        assert_eq!(word.text, "Library");
        assert_eq!(word.mastery_level, 88);
        assert_eq!(word.last_practiced, Some(1_234));
        assert!(state.last_result().unwrap().is_good());
        assert_eq!(state.words()[0].mastery_level, 0);

        state.next_word();
        assert!(state.last_result().is_none());
    }

    #[test]
    fn test_add_word_jumps_to_it() {
        let mut state = PracticeState::new(default_words());
        let mut word = default_words().remove(0);
        word.id = "galaxy".to_string();
        word.text = "Galaxy".to_string();
        state.add_word(word);
        assert_eq!(state.current_index(), 5);
        assert_eq!(state.current_word().unwrap().text, "Galaxy");
    }

    #[test]
    fn test_find() {
        let state = PracticeState::new(default_words());
        assert_eq!(state.find("library"), Some(1));
        assert_eq!(state.find("4"), Some(3));
        assert_eq!(state.find("zebra"), None);
    }
}
