//! Audio capture and playback
//!
//! Capture produces immutable [`AudioClip`]s and feeds a rolling amplitude
//! window that visualizers may sample from another task.

mod capture;
mod clip;
mod meter;
mod playback;

pub use capture::{AudioDevice, CaptureSession, CpalDevice, SAMPLE_RATE, samples_to_wav};
pub use clip::AudioClip;
pub use meter::{AmplitudeWindow, WINDOW_LEN};
pub use playback::AudioPlayback;
