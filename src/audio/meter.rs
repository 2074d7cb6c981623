//! Rolling amplitude window for visualization
//!
//! One writer (the capture callback) pushes; any number of readers take
//! snapshots. Staleness is fine, torn reads are not, so reads copy the
//! whole window under the lock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Number of amplitude samples the window retains
pub const WINDOW_LEN: usize = 80;

/// Fixed-length rolling window of recent amplitudes in `[0.0, 1.0]`
///
/// Cloning shares the underlying window.
#[derive(Debug, Clone)]
pub struct AmplitudeWindow {
    inner: Arc<Mutex<VecDeque<f32>>>,
}

impl AmplitudeWindow {
    /// Create an empty window
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(WINDOW_LEN))),
        }
    }

    /// Push one amplitude, evicting the oldest once full
    pub fn push(&self, amplitude: f32) {
        if let Ok(mut window) = self.inner.lock() {
            if window.len() == WINDOW_LEN {
                window.pop_front();
            }
            window.push_back(amplitude.clamp(0.0, 1.0));
        }
    }

    /// Copy the current window contents, oldest first
    #[must_use]
    pub fn snapshot(&self) -> Vec<f32> {
        self.inner
            .lock()
            .map(|window| window.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Clear the window (start of a new capture)
    pub fn reset(&self) {
        if let Ok(mut window) = self.inner.lock() {
            window.clear();
        }
    }

    /// Peak amplitude currently in the window
    #[must_use]
    pub fn peak(&self) -> f32 {
        self.inner
            .lock()
            .map(|window| window.iter().copied().fold(0.0f32, f32::max))
            .unwrap_or(0.0)
    }
}

impl Default for AmplitudeWindow {
    fn default() -> Self {
        Self::new()
    }
}
