use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Samples averaged across channels, scaled to -1.0..1.0
    pub fn mono_f32(&self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        self.samples
            .chunks(channels)
            .map(|frame| {
                let sum: f32 = frame.iter().map(|&s| s as f32 / 32768.0).sum();
                sum / frame.len() as f32
            })
            .collect()
    }
}

/// Configuration for audio capture
#[derive(Debug, Clone)]
pub struct AudioCaptureConfig {
    /// Sample rate expected by the recognition engine
    pub target_sample_rate: u32,
    /// Channel count expected by the recognition engine (1 = mono)
    pub target_channels: u16,
    /// Frame size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for AudioCaptureConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000, // 16kHz for recognition
            target_channels: 1,        // Mono
            buffer_duration_ms: 100,   // 100ms frames
        }
    }
}

/// A running microphone capture
#[async_trait::async_trait]
pub trait AudioCapture: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if capture is currently running
    fn is_capturing(&self) -> bool;

    /// Capture name for logging
    fn name(&self) -> &str;
}

/// Opens a fresh capture for every recognition session
///
/// Failing here (or in `AudioCapture::start`) means the microphone is not
/// available to us.
pub trait CaptureDevice: Send + Sync {
    fn open(&self, config: &AudioCaptureConfig) -> Result<Box<dyn AudioCapture>>;
}

/// Playback destination for synthesized speech
///
/// `pause` stops output immediately; `close` releases the device and makes
/// further writes fail.
pub trait AudioSink: Send + Sync {
    fn resume(&self);

    fn pause(&self);

    /// Queue a chunk of synthesized audio (16-bit little-endian PCM)
    fn write(&self, chunk: &[u8]) -> Result<()>;

    fn close(&self) -> Result<()>;

    fn name(&self) -> &str;
}

/// Creates the sink for each synthesis session
pub trait AudioSinkFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn AudioSink>>;
}
