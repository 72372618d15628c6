// Integration tests for the WAV-backed audio endpoints
//
// WAV fixtures are generated into a temp directory, replayed as microphone
// input, and synthesized audio is written back out and re-read with hound.

use anyhow::Result;
use speech_duplex::audio::{
    AudioCaptureConfig, AudioFile, AudioSink, AudioSinkFactory, CaptureDevice, SinkFormat,
    WavFileDevice, WavFileSink, WavFileSinkFactory,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_wav(path: &Path, sample_rate: u32, channels: u16, seconds: f32) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    let total = (sample_rate as f32 * seconds) as usize * channels as usize;
    for i in 0..total {
        writer.write_sample(((i % 200) as i16 - 100) * 50)?;
    }
    writer.finalize()?;
    Ok(())
}

fn fixture(
    dir: &TempDir,
    name: &str,
    sample_rate: u32,
    channels: u16,
    seconds: f32,
) -> Result<PathBuf> {
    let path = dir.path().join(name);
    write_wav(&path, sample_rate, channels, seconds)?;
    Ok(path)
}

#[test]
fn test_audio_file_open() -> Result<()> {
    let dir = TempDir::new()?;
    let path = fixture(&dir, "utterance.wav", 16000, 1, 0.5)?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.sample_rate, 16000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples.len(), 8000);
    assert!((audio.duration_seconds - 0.5).abs() < 1e-6);
    assert!(audio.path.contains("utterance.wav"));
    Ok(())
}

#[test]
fn test_audio_file_nonexistent() {
    let result = AudioFile::open("/nonexistent/path/to/audio.wav");
    assert!(result.is_err(), "Opening nonexistent file should fail");
}

#[test]
fn test_frames_split_by_duration() -> Result<()> {
    let dir = TempDir::new()?;
    let path = fixture(&dir, "stereo.wav", 8000, 2, 0.25)?;
    let audio = AudioFile::open(&path)?;

    let frames = audio.frames(100);

    // 100ms of 8kHz stereo = 1600 interleaved samples; the last frame is short
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].samples.len(), 1600);
    assert_eq!(frames[2].samples.len(), 800);
    assert_eq!(frames[1].timestamp_ms, 100);
    assert!(frames.iter().all(|f| f.channels == 2 && f.sample_rate == 8000));
    Ok(())
}

#[tokio::test]
async fn test_wav_device_replays_as_microphone() -> Result<()> {
    let dir = TempDir::new()?;
    let path = fixture(&dir, "mic.wav", 16000, 1, 0.375)?;

    let device = WavFileDevice::new(&path).realtime(false);
    let mut capture = device.open(&AudioCaptureConfig::default())?;
    let mut rx = capture.start().await?;

    let mut frames = Vec::new();
    while let Some(frame) = rx.recv().await {
        frames.push(frame);
    }

    assert_eq!(frames.len(), 4);
    let total: usize = frames.iter().map(|f| f.samples.len()).sum();
    assert_eq!(total, 6000);
    assert_eq!(frames[3].timestamp_ms, 300);

    capture.stop().await?;
    assert!(!capture.is_capturing());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_wav_device_realtime_pacing() -> Result<()> {
    let dir = TempDir::new()?;
    let path = fixture(&dir, "mic.wav", 16000, 1, 0.5)?;

    let mut capture = WavFileDevice::new(&path).open(&AudioCaptureConfig::default())?;
    let started = tokio::time::Instant::now();
    let mut rx = capture.start().await?;

    let mut count = 0;
    while rx.recv().await.is_some() {
        count += 1;
    }

    assert_eq!(count, 5);
    assert!(started.elapsed() >= std::time::Duration::from_millis(400));
    Ok(())
}

#[test]
fn test_wav_device_missing_file_is_refused() {
    let device = WavFileDevice::new("/nonexistent/mic.wav");
    assert!(device.open(&AudioCaptureConfig::default()).is_err());
}

#[test]
fn test_wav_sink_writes_only_while_playing() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("speaker.wav");
    let sink = WavFileSink::create(path.clone(), SinkFormat::default())?;

    // Paused until resumed
    sink.write(&[1, 0, 2, 0])?;
    assert_eq!(sink.samples_written(), 0);

    sink.resume();
    sink.write(&[1, 0, 2, 0, 255, 255])?;
    sink.pause();
    sink.write(&[9, 0])?;
    sink.close()?;

    assert_eq!(sink.samples_written(), 3);
    assert!(sink.write(&[1, 0]).is_err(), "Writes after close must fail");
    sink.close()?;

    let reader = hound::WavReader::open(&path)?;
    assert_eq!(reader.spec().sample_rate, 16000);
    let samples: Vec<i16> = reader.into_samples::<i16>().collect::<Result<_, _>>()?;
    assert_eq!(samples, vec![1, 2, -1]);
    Ok(())
}

#[test]
fn test_sink_factory_creates_one_file_per_session() -> Result<()> {
    let dir = TempDir::new()?;
    let factory = WavFileSinkFactory::new(dir.path().join("out"), "reply")?.with_format(SinkFormat {
        sample_rate: 24000,
        channels: 1,
    });

    let first = factory.create()?;
    let second = factory.create()?;
    first.close()?;
    second.close()?;

    let first_path = dir.path().join("out").join("reply-000.wav");
    let second_path = dir.path().join("out").join("reply-001.wav");
    assert!(first_path.exists());
    assert!(second_path.exists());
    assert_eq!(hound::WavReader::open(&second_path)?.spec().sample_rate, 24000);
    Ok(())
}
