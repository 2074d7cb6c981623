//! Nova Gate - voice-gated authentication and command dispatch
//!
//! This library provides the core pipeline for a voice-locked assistant:
//! - Timed audio capture with a live amplitude feed for visualizers
//! - Speaker verification (embedding + cosine similarity against an
//!   enrolled template)
//! - Wake-phrase matching
//! - A single-threaded gate state machine that unlocks into a spoken
//!   command loop dispatched to an external assistant
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                 Observers                        │
//! │   TTS feedback  │  status log  │  visualizer     │
//! └───────────────────────┬──────────────────────────┘
//!                         │ NotificationSink
//! ┌───────────────────────▼──────────────────────────┐
//! │             VoiceGateStateMachine                │
//! │   capture → transcribe → match/verify → dispatch │
//! └───────────────────────┬──────────────────────────┘
//!                         │
//! ┌───────────────────────▼──────────────────────────┐
//! │   Collaborators (STT │ TTS │ embedding │ LLM)    │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod dispatch;
pub mod enrollment;
pub mod error;
pub mod gate;
pub mod notify;
pub mod speaker;
pub mod stt;
pub mod tts;
pub mod wake;

pub use audio::{AmplitudeWindow, AudioClip, AudioDevice, CaptureSession, SAMPLE_RATE};
pub use config::Config;
pub use dispatch::{AssistantCompletion, CommandDispatcher, CommandExchange, CommandOutcome};
pub use enrollment::{EnrollmentProfile, EnrollmentStore};
pub use error::{Error, Result};
pub use gate::{GateState, RelockHandle, VoiceGateStateMachine};
pub use notify::{CompositeSink, NotificationSink, SpokenSink, TracingSink};
pub use speaker::{
    EmbeddingExtractor, SpeakerVerifier, Verification, VerificationResult, cosine_similarity,
};
pub use stt::Transcriber;
pub use tts::Synthesizer;
pub use wake::PhraseMatcher;
