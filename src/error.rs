use thiserror::Error;

/// Failures surfaced by the speech pipeline
///
/// Capability implementations (engines, capture devices, sinks, credential
/// sources) report `anyhow` errors; the sessions fold them into this taxonomy
/// before anything reaches the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpeechError {
    /// Credential issuance unreachable or rejected
    #[error("failed to obtain speech credential: {0}")]
    AuthFailure(String),

    /// Microphone permission denied or device unavailable
    #[error("microphone unavailable: {0}")]
    DeviceAccessFailure(String),

    /// Provider-side cancellation of continuous recognition
    #[error("speech recognition canceled: {0}")]
    RecognitionCanceled(String),

    /// Provider-side cancellation of an utterance, or the utterance was interrupted
    #[error("speech synthesis canceled: {0}")]
    SynthesisCanceled(String),

    /// Final transcript that is empty or has no alphabetic characters
    #[error("recognition result discarded: {0}")]
    MalformedResult(String),

    /// Recognition or synthesis engine could not be created or started
    #[error("speech engine error: {0}")]
    Engine(String),

    /// Voice enumeration returned nothing for the locale
    #[error("no voices available for locale {0}")]
    NoVoices(String),

    /// The synthesizer was stopped
    #[error("synthesis session is closed")]
    SessionClosed,
}

pub type SpeechResult<T> = std::result::Result<T, SpeechError>;

/// Render an `anyhow` chain on one line
pub(crate) fn describe(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}
