//! Shared mock collaborators for integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use nova_gate::audio::{AmplitudeWindow, AudioClip, AudioDevice};
use nova_gate::dispatch::AssistantCompletion;
use nova_gate::gate::{GateState, RelockHandle};
use nova_gate::notify::NotificationSink;
use nova_gate::speaker::EmbeddingExtractor;
use nova_gate::stt::Transcriber;
use nova_gate::{Error, Result};

/// Scripted microphone that can fire shutdown or re-lock signals after a
/// given number of captures
#[derive(Default)]
pub struct MockDeviceState {
    captures: AtomicUsize,
    shutdown: Mutex<Option<(usize, mpsc::Sender<()>, usize)>>,
    relock: Mutex<Option<(usize, RelockHandle)>>,
    failures: Mutex<Vec<usize>>,
}

impl MockDeviceState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// After capture number `after`, push `tokens` shutdown messages
    pub fn shutdown_after(&self, after: usize, tx: mpsc::Sender<()>, tokens: usize) {
        *self.shutdown.lock().unwrap() = Some((after, tx, tokens));
    }

    /// After capture number `after`, request a re-lock
    pub fn relock_after(&self, after: usize, handle: RelockHandle) {
        *self.relock.lock().unwrap() = Some((after, handle));
    }

    /// Make capture number `n` fail as if the device were unavailable
    pub fn fail_capture(&self, n: usize) {
        self.failures.lock().unwrap().push(n);
    }

    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

pub struct MockDevice(pub Arc<MockDeviceState>);

#[async_trait(?Send)]
impl AudioDevice for MockDevice {
    async fn capture_samples(
        &self,
        _duration: Duration,
        _sample_rate: u32,
        meter: &AmplitudeWindow,
    ) -> Result<Vec<f32>> {
        let n = self.0.captures.fetch_add(1, Ordering::SeqCst) + 1;
        meter.push(0.2);

        if let Some((after, tx, tokens)) = self.0.shutdown.lock().unwrap().as_ref() {
            if n == *after {
                for _ in 0..*tokens {
                    let _ = tx.try_send(());
                }
            }
        }
        if let Some((after, handle)) = self.0.relock.lock().unwrap().as_ref() {
            if n == *after {
                handle.relock();
            }
        }
        if self.0.failures.lock().unwrap().contains(&n) {
            return Err(Error::Audio("input device unavailable".to_string()));
        }

        Ok(vec![0.05; 64])
    }
}

/// Transcriber that replays a fixed script, then falls back to silence
pub struct MockTranscriber {
    script: Mutex<VecDeque<String>>,
}

impl MockTranscriber {
    pub fn new(transcripts: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(transcripts.iter().map(ToString::to_string).collect()),
        })
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _clip: &AudioClip) -> String {
        self.script.lock().unwrap().pop_front().unwrap_or_default()
    }
}

/// Extractor that returns the same embedding for every clip
pub struct MockExtractor {
    embedding: Vec<f32>,
}

impl MockExtractor {
    pub fn new(embedding: Vec<f32>) -> Arc<Self> {
        Arc::new(Self { embedding })
    }
}

#[async_trait]
impl EmbeddingExtractor for MockExtractor {
    async fn embed(&self, _clip: &AudioClip) -> Result<Vec<f32>> {
        Ok(self.embedding.clone())
    }
}

/// Assistant that counts calls and echoes a canned reply
pub struct MockAssistant {
    pub calls: AtomicUsize,
    reply: String,
    fail: bool,
}

impl MockAssistant {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            reply: reply.to_string(),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            reply: String::new(),
            fail: true,
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssistantCompletion for MockAssistant {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Assistant("simulated outage".to_string()));
        }
        Ok(self.reply.clone())
    }
}

/// Sink that records every notification as a tagged string
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.events().iter().any(|e| e == event)
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl NotificationSink for RecordingSink {
    fn state_entered(&self, state: GateState) {
        self.push(format!("state:{state}"));
    }

    fn status(&self, message: &str) {
        self.push(format!("status:{message}"));
    }

    fn transcript_detected(&self, transcript: &str) {
        self.push(format!("transcript:{transcript}"));
    }

    fn speak(&self, text: &str) {
        self.push(format!("speak:{text}"));
    }
}
