use anyhow::{anyhow, bail, Context, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use super::backend::{AudioSink, AudioSinkFactory};

/// Sample format of synthesized audio
#[derive(Debug, Clone, Copy)]
pub struct SinkFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for SinkFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
        }
    }
}

/// Creates one WAV file per synthesis session
///
/// Files are named `{prefix}-{index:03}.wav`, so an interrupted session and
/// its replacement land in separate files.
pub struct WavFileSinkFactory {
    output_dir: PathBuf,
    prefix: String,
    format: SinkFormat,
    next_index: AtomicUsize,
}

impl WavFileSinkFactory {
    pub fn new(output_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)
            .context("Failed to create output directory")?;

        Ok(Self {
            output_dir,
            prefix: prefix.into(),
            format: SinkFormat::default(),
            next_index: AtomicUsize::new(0),
        })
    }

    pub fn with_format(mut self, format: SinkFormat) -> Self {
        self.format = format;
        self
    }
}

impl AudioSinkFactory for WavFileSinkFactory {
    fn create(&self) -> Result<Arc<dyn AudioSink>> {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let path = self
            .output_dir
            .join(format!("{}-{:03}.wav", self.prefix, index));
        Ok(Arc::new(WavFileSink::create(path, self.format)?))
    }
}

struct SinkState {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    playing: bool,
    samples_written: usize,
}

/// Writes synthesized speech to a WAV file
///
/// Chunks arriving while paused are dropped, mirroring a speaker that has
/// been silenced.
pub struct WavFileSink {
    path: PathBuf,
    state: Mutex<SinkState>,
}

impl WavFileSink {
    pub fn create(path: PathBuf, format: SinkFormat) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

        info!("Speaker output: {}", path.display());

        Ok(Self {
            path,
            state: Mutex::new(SinkState {
                writer: Some(writer),
                playing: false,
                samples_written: 0,
            }),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn samples_written(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.samples_written)
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SinkState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("Speaker state poisoned"))
    }
}

impl AudioSink for WavFileSink {
    fn resume(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.playing = true;
        }
    }

    fn pause(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.playing = false;
        }
    }

    fn write(&self, chunk: &[u8]) -> Result<()> {
        let mut state = self.lock()?;
        let playing = state.playing;
        let Some(writer) = state.writer.as_mut() else {
            bail!("Speaker is closed");
        };
        if !playing {
            return Ok(());
        }

        let mut written = 0;
        for pair in chunk.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .context("Failed to write sample to WAV")?;
            written += 1;
        }
        state.samples_written += written;

        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.playing = false;
        if let Some(writer) = state.writer.take() {
            writer.finalize()
                .context("Failed to finalize WAV file")?;
            info!(
                "Speaker closed: {} ({} samples)",
                self.path.display(),
                state.samples_written
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "WAV file speaker"
    }
}

impl Drop for WavFileSink {
    fn drop(&mut self) {
        if let Ok(state) = self.state.get_mut() {
            if let Some(writer) = state.writer.take() {
                if let Err(e) = writer.finalize() {
                    warn!("Failed to finalize WAV writer on drop: {}", e);
                }
            }
        }
    }
}
