pub mod audio;
pub mod config;
pub mod conversation;
pub mod credential;
pub mod error;
pub mod http;
pub mod recognizer;
pub mod synthesizer;

pub use audio::{
    AudioCapture, AudioCaptureConfig, AudioFile, AudioFrame, AudioSink, AudioSinkFactory,
    CaptureDevice, VolumeAnalyser, WavFileDevice, WavFileSink, WavFileSinkFactory,
};
pub use config::Config;
pub use credential::{
    Credential, CredentialCache, CredentialSource, HttpCredentialSource, StsIssuer,
};
pub use error::{SpeechError, SpeechResult};
pub use http::{create_router, AppState};
pub use recognizer::{Recognizer, RecognizerConfig, RecognizerState, SpeechEvent};
pub use synthesizer::{Playback, SynthesisEvent, Synthesizer};
