// Recognition engine capability
//
// The cloud recognizer is driven through this boundary. An engine is built
// for one session with everything it needs up front: the settings, the audio
// it should consume and the sink its events go to. Events arrive on that sink
// in provider order.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::audio::AudioFrame;

/// Locale every session recognizes
pub const RECOGNITION_LOCALE: &str = "en-US";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Simple,
    /// Results carry the provider's JSON (n-best list, word timing, assessment)
    Detailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradingSystem {
    FivePoint,
    HundredMark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Phoneme,
    Word,
    FullText,
}

/// Pronunciation assessment add-on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PronunciationAssessmentSettings {
    /// Empty for unscripted speech
    pub reference_text: String,
    pub grading_system: GradingSystem,
    pub granularity: Granularity,
    pub enable_miscue: bool,
    pub enable_prosody: bool,
    /// Enables content assessment (grammar, vocabulary, topic) against a topic
    pub content_topic: Option<String>,
}

impl PronunciationAssessmentSettings {
    pub fn unscripted(topic: Option<String>) -> Self {
        Self {
            reference_text: String::new(),
            grading_system: GradingSystem::HundredMark,
            granularity: Granularity::Phoneme,
            enable_miscue: true,
            enable_prosody: true,
            content_topic: topic,
        }
    }
}

/// Everything an engine needs to run one continuous recognition session
#[derive(Debug, Clone)]
pub struct RecognitionSettings {
    pub token: String,
    pub region: String,
    pub language: String,
    pub output_format: OutputFormat,
    /// Voice-activity silence timeout; provider default when `None`
    pub segmentation_silence_timeout_ms: Option<u32>,
    pub pronunciation: Option<PronunciationAssessmentSettings>,
    /// Terms to bias recognition toward
    pub phrase_list: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultReason {
    RecognizingSpeech,
    RecognizedSpeech,
    NoMatch,
}

#[derive(Debug, Clone)]
pub struct RecognitionResult {
    pub reason: ResultReason,
    pub text: String,
    /// Detailed provider JSON, when available
    pub json: Option<String>,
}

impl RecognitionResult {
    pub fn recognizing(text: impl Into<String>) -> Self {
        Self {
            reason: ResultReason::RecognizingSpeech,
            text: text.into(),
            json: None,
        }
    }

    pub fn recognized(text: impl Into<String>, json: Option<String>) -> Self {
        Self {
            reason: ResultReason::RecognizedSpeech,
            text: text.into(),
            json,
        }
    }

    pub fn no_match() -> Self {
        Self {
            reason: ResultReason::NoMatch,
            text: String::new(),
            json: None,
        }
    }
}

/// Events an engine delivers while recognizing
#[derive(Debug, Clone)]
pub enum RecognitionEvent {
    /// Interim hypothesis for the utterance in progress
    Interim(RecognitionResult),
    /// Final result for an utterance (or a no-match)
    Final(RecognitionResult),
    /// Provider canceled the session
    Canceled { details: String },
    /// Provider ended the session
    SessionEnded,
}

/// A live continuous-recognition engine
#[async_trait::async_trait]
pub trait RecognitionEngine: Send + Sync {
    async fn start_continuous(&self) -> Result<()>;

    /// Must tolerate being called more than once
    async fn stop_continuous(&self) -> Result<()>;

    /// Swap the bearer token without interrupting recognition
    fn set_authorization_token(&self, token: &str);

    async fn close(&self) -> Result<()>;
}

/// Builds an engine per recognition session
pub trait RecognitionEngineFactory: Send + Sync {
    fn create(
        &self,
        settings: RecognitionSettings,
        audio: mpsc::Receiver<AudioFrame>,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> Result<Arc<dyn RecognitionEngine>>;
}
