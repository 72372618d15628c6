use super::assessment::PronunciationScores;
use crate::error::SpeechError;

/// What the recognizer reports to its caller
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechEvent {
    /// Microphone level, 0.0..=1.0
    VolumeChanged(f32),
    /// First interim result of an utterance
    SpeechStarted,
    /// Interim transcript of the utterance in progress
    SpeechUpdated(String),
    /// Final transcript of an accepted utterance
    SpeechEnded(String),
    PronunciationAssessed(PronunciationScores),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizerState {
    Idle,
    Starting,
    Listening,
    Speaking,
    Stopping,
}

/// Accept a final transcript only if it has visible, alphabetic content
pub fn validate_transcript(text: &str) -> Result<&str, SpeechError> {
    if text.trim().is_empty() {
        return Err(SpeechError::MalformedResult(
            "empty speech recognition result".to_string(),
        ));
    }
    if !text.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(SpeechError::MalformedResult(format!(
            "no valid words in {:?}",
            text
        )));
    }
    Ok(text)
}
