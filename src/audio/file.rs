use anyhow::{bail, Context, Result};
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{AudioCapture, AudioCaptureConfig, AudioFrame, CaptureDevice};

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds = samples.len() as f64 /
            (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split the samples into fixed-duration frames
    pub fn frames(&self, frame_duration_ms: u64) -> Vec<AudioFrame> {
        let per_frame = (self.sample_rate as u64 * frame_duration_ms / 1000) as usize
            * self.channels as usize;
        if per_frame == 0 {
            return Vec::new();
        }

        self.samples
            .chunks(per_frame)
            .enumerate()
            .map(|(i, chunk)| AudioFrame {
                samples: chunk.to_vec(),
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: i as u64 * frame_duration_ms,
            })
            .collect()
    }
}

/// Microphone stand-in that replays a WAV file
///
/// Frames are emitted at real-time pace unless `realtime` is disabled.
pub struct WavFileDevice {
    path: PathBuf,
    realtime: bool,
}

impl WavFileDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            realtime: true,
        }
    }

    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }
}

impl CaptureDevice for WavFileDevice {
    fn open(&self, config: &AudioCaptureConfig) -> Result<Box<dyn AudioCapture>> {
        if !self.path.exists() {
            bail!("Audio file not found: {}", self.path.display());
        }
        Ok(Box::new(WavFileCapture {
            path: self.path.clone(),
            realtime: self.realtime,
            config: config.clone(),
            task: None,
        }))
    }
}

pub struct WavFileCapture {
    path: PathBuf,
    realtime: bool,
    config: AudioCaptureConfig,
    task: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl AudioCapture for WavFileCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.is_capturing() {
            bail!("Already capturing");
        }

        let audio = AudioFile::open(&self.path)?;
        if audio.sample_rate != self.config.target_sample_rate
            || audio.channels != self.config.target_channels
        {
            debug!(
                "Replaying {}Hz/{}ch audio for a {}Hz/{}ch consumer",
                audio.sample_rate,
                audio.channels,
                self.config.target_sample_rate,
                self.config.target_channels
            );
        }

        let frame_ms = self.config.buffer_duration_ms.max(1);
        let frames = audio.frames(frame_ms);
        let realtime = self.realtime;
        let (tx, rx) = mpsc::channel(100);

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(frame_ms));
            for frame in frames {
                if realtime {
                    ticker.tick().await;
                }
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
            debug!("Audio file replay finished");
        }));

        info!("Replaying {} as microphone input", self.path.display());
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Audio file replay stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn name(&self) -> &str {
        "WAV file replay"
    }
}
