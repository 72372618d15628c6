// Microphone level meter
//
// Reproduces the browser analyser node the UI's volume indicator was tuned
// against: a 256-point Blackman-windowed FFT, magnitudes smoothed over time,
// converted to decibels and mapped onto bytes between -100 dB and -30 dB.
// The reported level is the mean of the 128 frequency bins divided by 255.

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::Arc;

use super::backend::AudioFrame;

pub const FFT_SIZE: usize = 256;
pub const FREQUENCY_BIN_COUNT: usize = FFT_SIZE / 2;

const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;
const SMOOTHING_TIME_CONSTANT: f32 = 0.8;

pub struct VolumeAnalyser {
    fft: Arc<dyn Fft<f32>>,
    fft_buf: Vec<Complex32>,
    window: Vec<f32>,
    /// Most recent FFT_SIZE mono samples
    history: VecDeque<f32>,
    /// Smoothed linear magnitudes, one per bin
    smoothed: Vec<f32>,
}

impl VolumeAnalyser {
    pub fn new() -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);

        // Blackman window, as used by the reference analyser
        let n = FFT_SIZE as f32;
        let window = (0..FFT_SIZE)
            .map(|i| {
                let x = i as f32 / n;
                0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
            })
            .collect();

        Self {
            fft,
            fft_buf: vec![Complex32::new(0.0, 0.0); FFT_SIZE],
            window,
            history: std::iter::repeat(0.0).take(FFT_SIZE).collect(),
            smoothed: vec![0.0; FREQUENCY_BIN_COUNT],
        }
    }

    /// Feed captured audio (mixed down to mono)
    pub fn push_frame(&mut self, frame: &AudioFrame) {
        for sample in frame.mono_f32() {
            if self.history.len() == FFT_SIZE {
                self.history.pop_front();
            }
            self.history.push_back(sample);
        }
    }

    /// Byte-scaled frequency data for the current analysis window
    pub fn byte_frequency_data(&mut self) -> [u8; FREQUENCY_BIN_COUNT] {
        for ((dst, &x), &w) in self.fft_buf.iter_mut().zip(&self.history).zip(&self.window) {
            *dst = Complex32::new(x * w, 0.0);
        }
        self.fft.process(&mut self.fft_buf);

        let scale = 1.0 / FFT_SIZE as f32;
        let mut out = [0u8; FREQUENCY_BIN_COUNT];
        for (k, byte) in out.iter_mut().enumerate() {
            let magnitude = self.fft_buf[k].norm() * scale;
            let smoothed = SMOOTHING_TIME_CONSTANT * self.smoothed[k]
                + (1.0 - SMOOTHING_TIME_CONSTANT) * magnitude;
            self.smoothed[k] = smoothed;
            *byte = to_byte(smoothed);
        }
        out
    }

    /// Mean bin energy normalized to 0..1
    pub fn level(&mut self) -> f32 {
        let data = self.byte_frequency_data();
        let sum: u32 = data.iter().map(|&b| b as u32).sum();
        let average = sum as f32 / FREQUENCY_BIN_COUNT as f32;
        (average / 255.0).clamp(0.0, 1.0)
    }
}

impl Default for VolumeAnalyser {
    fn default() -> Self {
        Self::new()
    }
}

fn to_byte(magnitude: f32) -> u8 {
    if magnitude <= 0.0 {
        return 0;
    }
    let db = 20.0 * magnitude.log10();
    let scaled = 255.0 * (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS);
    scaled.clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(samples: Vec<i16>) -> AudioFrame {
        AudioFrame {
            samples,
            sample_rate: 16000,
            channels: 1,
            timestamp_ms: 0,
        }
    }

    fn noise(len: usize, amplitude: f32) -> Vec<i16> {
        let mut seed: u32 = 0x1234_5678;
        (0..len)
            .map(|_| {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let unit = (seed >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0;
                (unit * amplitude * i16::MAX as f32) as i16
            })
            .collect()
    }

    #[test]
    fn test_silence_is_zero() {
        let mut analyser = VolumeAnalyser::new();
        analyser.push_frame(&frame(vec![0; 1600]));
        assert_eq!(analyser.level(), 0.0);
    }

    #[test]
    fn test_loud_noise_reads_high() {
        let mut analyser = VolumeAnalyser::new();
        analyser.push_frame(&frame(noise(1600, 1.0)));
        // Let the smoothing settle
        let mut level = 0.0;
        for _ in 0..20 {
            level = analyser.level();
        }
        assert!(level > 0.5, "level was {}", level);
        assert!(level <= 1.0);
    }

    #[test]
    fn test_louder_input_reads_higher() {
        let mut quiet = VolumeAnalyser::new();
        let mut loud = VolumeAnalyser::new();
        quiet.push_frame(&frame(noise(1600, 0.01)));
        loud.push_frame(&frame(noise(1600, 0.8)));
        assert!(loud.level() > quiet.level());
    }

    #[test]
    fn test_stereo_is_mixed_down() {
        let mut analyser = VolumeAnalyser::new();
        let stereo = AudioFrame {
            samples: vec![1000, -1000, 2000, -2000],
            sample_rate: 16000,
            channels: 2,
            timestamp_ms: 0,
        };
        assert_eq!(stereo.mono_f32(), vec![0.0, 0.0]);
        analyser.push_frame(&stereo);
        assert_eq!(analyser.history.len(), FFT_SIZE);
    }
}
