// Synthesis engine capability
//
// A synthesis engine is bound to one voice and reports progress on the signal
// sender handed to it at construction. Audio for an utterance arrives as a
// run of `Synthesizing` chunks followed by `Completed` or `Canceled`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Locale voices are chosen from
pub const SYNTHESIS_LOCALE: &str = "en-US";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    /// Provider voice id, e.g. `en-US-AvaMultilingualNeural`
    pub name: String,
    pub display_name: String,
    pub locale: String,
}

impl Voice {
    /// First word of the display name
    pub fn short_name(&self) -> &str {
        self.display_name
            .split_whitespace()
            .next()
            .unwrap_or(&self.display_name)
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisSettings {
    pub token: String,
    pub region: String,
    pub language: String,
    /// Unset while enumerating voices
    pub voice_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisSignal {
    /// A chunk of 16-bit little-endian PCM for the utterance in progress
    Synthesizing(Vec<u8>),
    Completed,
    Canceled { details: String },
}

#[async_trait::async_trait]
pub trait SynthesisEngine: Send + Sync {
    /// Synthesize one utterance; progress arrives as signals
    ///
    /// Every signal for the utterance is sent before this returns. A failed
    /// call may or may not have sent `Canceled` first; signals left over from
    /// it are discarded before the next utterance starts.
    async fn speak(&self, text: &str) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[async_trait::async_trait]
pub trait SynthesisEngineFactory: Send + Sync {
    async fn voices(&self, settings: &SynthesisSettings) -> Result<Vec<Voice>>;

    fn create(
        &self,
        settings: SynthesisSettings,
        signals: mpsc::UnboundedSender<SynthesisSignal>,
    ) -> Result<Arc<dyn SynthesisEngine>>;
}
