//! Sentence buffering for streamed reply text
//!
//! Text arrives in arbitrary fragments. The buffer releases speakable
//! utterances that end on a terminal mark, and keeps whatever follows the
//! last mark for the next round.

/// Marks that end a speakable utterance
pub const TERMINAL_PUNCTUATION: [char; 3] = ['.', '!', '?'];

#[derive(Debug, Default, Clone)]
pub struct SentenceBuffer {
    text: String,
}

impl SentenceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) {
        self.text.push_str(fragment);
    }

    pub fn has_terminal(&self) -> bool {
        self.text.contains(TERMINAL_PUNCTUATION)
    }

    /// Take the next utterance, if one is ready
    ///
    /// The buffer is split after the rightmost terminal mark. Without a mark,
    /// nothing is taken unless `flush` is set, in which case the whole buffer
    /// goes. The returned text is trimmed; a blank utterance yields `None`
    /// but is still consumed.
    pub fn take_utterance(&mut self, flush: bool) -> Option<String> {
        let split = match self.text.rfind(TERMINAL_PUNCTUATION) {
            Some(index) => index + 1,
            None if flush => self.text.len(),
            None => return None,
        };

        let remainder = self.text.split_off(split);
        let utterance = std::mem::replace(&mut self.text, remainder);
        let utterance = utterance.trim();

        if utterance.is_empty() {
            None
        } else {
            Some(utterance.to_string())
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}
