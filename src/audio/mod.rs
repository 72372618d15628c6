pub mod analyser;
pub mod backend;
pub mod file;
pub mod sink;

pub use analyser::VolumeAnalyser;
pub use backend::{
    AudioCapture, AudioCaptureConfig, AudioFrame, AudioSink, AudioSinkFactory, CaptureDevice,
};
pub use file::{AudioFile, WavFileCapture, WavFileDevice};
pub use sink::{SinkFormat, WavFileSink, WavFileSinkFactory};
