//! Timed audio capture from the microphone

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;

use super::clip::AudioClip;
use super::meter::AmplitudeWindow;
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Gain applied to mean amplitude before it enters the rolling window
const METER_GAIN: f32 = 3.7;

/// A microphone-like source of timed sample windows
///
/// The device blocks for the full requested duration (no early return on
/// silence) and feeds per-chunk amplitudes into `meter` while recording.
#[async_trait(?Send)]
pub trait AudioDevice {
    /// Record mono samples for exactly `duration`
    ///
    /// # Errors
    ///
    /// Returns error if the device is unavailable or the stream fails
    async fn capture_samples(
        &self,
        duration: Duration,
        sample_rate: u32,
        meter: &AmplitudeWindow,
    ) -> Result<Vec<f32>>;
}

/// Captures audio from the default `cpal` input device
pub struct CpalDevice;

impl CpalDevice {
    /// Create a capture device, verifying a usable input config exists
    ///
    /// # Errors
    ///
    /// Returns error if no input device or no mono 16kHz config is available
    pub fn new() -> Result<Self> {
        let device = Self::input_device()?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            "audio capture device ready"
        );

        Ok(Self)
    }

    fn input_device() -> Result<cpal::Device> {
        cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))
    }

    fn input_config(device: &cpal::Device, sample_rate: u32) -> Result<cpal::StreamConfig> {
        let supported = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        Ok(supported.with_sample_rate(SampleRate(sample_rate)).config())
    }
}

#[async_trait(?Send)]
impl AudioDevice for CpalDevice {
    async fn capture_samples(
        &self,
        duration: Duration,
        sample_rate: u32,
        meter: &AmplitudeWindow,
    ) -> Result<Vec<f32>> {
        let device = Self::input_device()?;
        let config = Self::input_config(&device, sample_rate)?;

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let buffer_writer = Arc::clone(&buffer);
        let meter_writer = meter.clone();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    meter_writer.push(mean_amplitude(data) * METER_GAIN);
                    if let Ok(mut buf) = buffer_writer.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        // The window always runs to completion; cancellation is honored
        // between captures, never mid-capture.
        tokio::time::sleep(duration).await;

        drop(stream);

        let samples = buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default();

        tracing::debug!(samples = samples.len(), "capture window complete");
        Ok(samples)
    }
}

/// One timed capture attempt, publishing live amplitudes while recording
pub struct CaptureSession {
    device: Box<dyn AudioDevice>,
    sample_rate: u32,
    window: AmplitudeWindow,
}

impl CaptureSession {
    /// Create a session over the given device
    #[must_use]
    pub fn new(device: Box<dyn AudioDevice>) -> Self {
        Self {
            device,
            sample_rate: SAMPLE_RATE,
            window: AmplitudeWindow::new(),
        }
    }

    /// Handle to the rolling amplitude window for visualization readers
    #[must_use]
    pub fn window(&self) -> AmplitudeWindow {
        self.window.clone()
    }

    /// Sample rate used for capture
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Record a clip of exactly `duration`
    ///
    /// # Errors
    ///
    /// Returns error if the device is unavailable
    pub async fn capture(&self, duration: Duration) -> Result<AudioClip> {
        self.window.reset();
        let samples = self
            .device
            .capture_samples(duration, self.sample_rate, &self.window)
            .await?;
        Ok(AudioClip::new(samples, self.sample_rate))
    }
}

/// Mean absolute amplitude of a chunk
fn mean_amplitude(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s.abs()).sum::<f32>() / samples.len() as f32
}

/// Convert f32 samples to WAV bytes for the STT and embedding APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
