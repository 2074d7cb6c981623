//! Gate event notification
//!
//! The state machine reports every transition, status line, detected
//! transcript, and spoken utterance through a [`NotificationSink`]. Sinks
//! must return quickly; anything slow (speech synthesis, playback) is
//! handed off to a worker so capture timing is never stalled.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::audio::AudioPlayback;
use crate::gate::GateState;
use crate::tts::Synthesizer;

/// Observer of gate activity
///
/// Called synchronously from the control loop on every transition, so
/// implementations must not block materially.
pub trait NotificationSink: Send + Sync {
    /// The gate entered a new state
    fn state_entered(&self, state: GateState);

    /// A user-facing status line changed
    fn status(&self, message: &str);

    /// A transcript was produced for the current cycle
    fn transcript_detected(&self, transcript: &str);

    /// Request that `text` be spoken to the user
    fn speak(&self, text: &str);
}

/// Sink that logs everything through `tracing`
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn state_entered(&self, state: GateState) {
        tracing::info!(state = %state, "gate state entered");
    }

    fn status(&self, message: &str) {
        tracing::info!(status = %message, "gate status");
    }

    fn transcript_detected(&self, transcript: &str) {
        tracing::info!(transcript = %transcript, "transcript detected");
    }

    fn speak(&self, _text: &str) {}
}

/// Sink that speaks utterances through a TTS synthesizer
///
/// Requests are queued to a dedicated worker thread that synthesizes and
/// plays them in order; `speak` itself never waits on audio.
pub struct SpokenSink {
    tx: mpsc::UnboundedSender<String>,
}

impl SpokenSink {
    /// Spawn the speech worker and return the sink
    pub fn spawn(synthesizer: Arc<dyn Synthesizer>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        std::thread::Builder::new()
            .name("nova-speech".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        tracing::error!(error = %e, "speech worker runtime failed");
                        return;
                    }
                };

                let playback = match AudioPlayback::new() {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::error!(error = %e, "speech playback unavailable");
                        return;
                    }
                };

                while let Some(text) = rx.blocking_recv() {
                    tracing::debug!(text = %text, "speaking");
                    match runtime.block_on(synthesizer.synthesize(&text)) {
                        Ok(audio) => {
                            if let Err(e) = playback.play_mp3(&audio) {
                                tracing::warn!(error = %e, "speech playback failed");
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "speech synthesis failed");
                        }
                    }
                }
            })
            .map_err(|e| tracing::error!(error = %e, "speech worker spawn failed"))
            .ok();

        Self { tx }
    }
}

impl NotificationSink for SpokenSink {
    fn state_entered(&self, _state: GateState) {}

    fn status(&self, _message: &str) {}

    fn transcript_detected(&self, _transcript: &str) {}

    fn speak(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.tx.send(text.to_string()).is_err() {
            tracing::warn!("speech worker gone, utterance dropped");
        }
    }
}

/// Fans every notification out to multiple sinks
pub struct CompositeSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl CompositeSink {
    /// Combine several sinks into one
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }
}

impl NotificationSink for CompositeSink {
    fn state_entered(&self, state: GateState) {
        for sink in &self.sinks {
            sink.state_entered(state);
        }
    }

    fn status(&self, message: &str) {
        for sink in &self.sinks {
            sink.status(message);
        }
    }

    fn transcript_detected(&self, transcript: &str) {
        for sink in &self.sinks {
            sink.transcript_detected(transcript);
        }
    }

    fn speak(&self, text: &str) {
        for sink in &self.sinks {
            sink.speak(text);
        }
    }
}
