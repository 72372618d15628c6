//! Continuous speech recognition
//!
//! A [`Recognizer`] couples microphone capture with a cloud recognition
//! engine. It reports interim and final transcripts, a live volume level and
//! optional pronunciation scores as [`SpeechEvent`]s, and keeps the engine's
//! authorization token fresh while listening.

pub mod assessment;
pub mod config;
pub mod engine;
pub mod events;
pub mod session;

pub use assessment::{ContentScores, PronunciationScores, WordAssessment};
pub use config::RecognizerConfig;
pub use engine::{
    GradingSystem, Granularity, OutputFormat, PronunciationAssessmentSettings, RecognitionEngine,
    RecognitionEngineFactory, RecognitionEvent, RecognitionResult, RecognitionSettings,
    ResultReason, RECOGNITION_LOCALE,
};
pub use events::{validate_transcript, RecognizerState, SpeechEvent};
pub use session::{Recognizer, TOKEN_REFRESH_INTERVAL, VOLUME_SAMPLE_INTERVAL};
