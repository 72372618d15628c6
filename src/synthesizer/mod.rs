//! Sentence-buffered speech synthesis with interruption

pub mod buffer;
pub mod engine;
pub mod session;

pub use buffer::{SentenceBuffer, TERMINAL_PUNCTUATION};
pub use engine::{
    SynthesisEngine, SynthesisEngineFactory, SynthesisSettings, SynthesisSignal, Voice,
    SYNTHESIS_LOCALE,
};
pub use session::{Playback, SynthesisEvent, Synthesizer, FLUSH_TIMEOUT};
