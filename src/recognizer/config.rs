use serde::{Deserialize, Serialize};
use tracing::warn;

use super::engine::{
    OutputFormat, PronunciationAssessmentSettings, RecognitionSettings, RECOGNITION_LOCALE,
};
use crate::credential::Credential;

/// Per-session recognition options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizerConfig {
    /// Topic for content assessment (only used with pronunciation assessment)
    #[serde(default)]
    pub topic: Option<String>,

    /// Domain terms to bias recognition toward
    #[serde(default)]
    pub phrase_list: Vec<String>,

    /// Voice-activity silence timeout; 1000-5000 ms recommended, 0 for the provider default
    #[serde(default)]
    pub silence_timeout_ms: Option<u32>,

    /// Score pronunciation of every accepted utterance
    #[serde(default)]
    pub assess_pronunciation: bool,
}

impl RecognizerConfig {
    pub fn recognition_settings(&self, credential: &Credential) -> RecognitionSettings {
        let silence_timeout_ms = self.silence_timeout_ms.filter(|&ms| ms > 0);
        if let Some(ms) = silence_timeout_ms {
            if !(1000..=5000).contains(&ms) {
                warn!("Silence timeout {}ms is outside the recommended 1000-5000ms", ms);
            }
        }

        RecognitionSettings {
            token: credential.token.clone(),
            region: credential.region.clone(),
            language: RECOGNITION_LOCALE.to_string(),
            output_format: OutputFormat::Detailed,
            segmentation_silence_timeout_ms: silence_timeout_ms,
            pronunciation: self
                .assess_pronunciation
                .then(|| PronunciationAssessmentSettings::unscripted(self.topic.clone())),
            phrase_list: self.phrase_list.clone(),
        }
    }
}
