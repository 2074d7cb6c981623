//! The voice gate state machine
//!
//! One control task drives the whole pipeline: capture a wake attempt,
//! transcribe it, match the phrase and verify the speaker, then either
//! unlock into the command loop or cool down and retry. Transitions are
//! strictly sequential; a single attempt is ever in flight.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::audio::CaptureSession;
use crate::dispatch::CommandDispatcher;
use crate::enrollment::EnrollmentStore;
use crate::notify::NotificationSink;
use crate::speaker::{SpeakerVerifier, Verification};
use crate::stt::Transcriber;
use crate::wake::PhraseMatcher;
use crate::Result;

/// Where the gate currently is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Idle between attempts; nothing is captured
    Locked,
    /// A wake-phrase capture window is open
    AwaitingWakeAttempt,
    /// A wake attempt is being matched and verified
    Verifying,
    /// Speaker verified; about to enter the command loop
    Unlocked,
    /// A command capture window is open
    AwaitingCommand,
    /// A command is on its way to the assistant
    Dispatching,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Locked => "locked",
            Self::AwaitingWakeAttempt => "awaiting-wake-attempt",
            Self::Verifying => "verifying",
            Self::Unlocked => "unlocked",
            Self::AwaitingCommand => "awaiting-command",
            Self::Dispatching => "dispatching",
        };
        f.write_str(name)
    }
}

/// External re-lock signal
///
/// Cloneable; `relock()` is honored at the top of the next capture cycle.
/// An in-flight capture always runs to completion first.
#[derive(Debug, Clone, Default)]
pub struct RelockHandle {
    flag: Arc<AtomicBool>,
}

impl RelockHandle {
    /// Create a fresh handle
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the gate return to `Locked`
    pub fn relock(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Consume a pending request, if any
    fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }
}

/// Timing knobs for the gate loop
#[derive(Debug, Clone, Copy)]
pub struct GateTiming {
    /// Length of a wake-attempt capture window
    pub wake_capture: Duration,
    /// Length of a command capture window
    pub command_capture: Duration,
    /// Pause after a rejected wake attempt
    pub cooldown: Duration,
    /// Pause after speaking a command response
    pub response_pause: Duration,
}

impl Default for GateTiming {
    fn default() -> Self {
        Self {
            wake_capture: Duration::from_secs(4),
            command_capture: Duration::from_secs(4),
            cooldown: Duration::from_secs(2),
            response_pause: Duration::from_secs(2),
        }
    }
}

/// Orchestrates capture, transcription, verification, and dispatch
pub struct VoiceGateStateMachine {
    capture: CaptureSession,
    transcriber: Arc<dyn Transcriber>,
    matcher: PhraseMatcher,
    verifier: SpeakerVerifier,
    store: EnrollmentStore,
    dispatcher: CommandDispatcher,
    sink: Arc<dyn NotificationSink>,
    timing: GateTiming,
    relock: RelockHandle,
    state: GateState,
}

/// How a single wake cycle ended
enum WakeCycle {
    /// Attempt rejected or failed; cool down and retry
    Retry,
    /// Speaker verified; command loop was entered and exited again
    Completed,
}

impl VoiceGateStateMachine {
    /// Assemble the machine from its collaborators
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        capture: CaptureSession,
        transcriber: Arc<dyn Transcriber>,
        matcher: PhraseMatcher,
        verifier: SpeakerVerifier,
        store: EnrollmentStore,
        dispatcher: CommandDispatcher,
        sink: Arc<dyn NotificationSink>,
        timing: GateTiming,
    ) -> Self {
        Self {
            capture,
            transcriber,
            matcher,
            verifier,
            store,
            dispatcher,
            sink,
            timing,
            relock: RelockHandle::new(),
            state: GateState::Locked,
        }
    }

    /// Handle for requesting a re-lock from outside the control task
    #[must_use]
    pub fn relock_handle(&self) -> RelockHandle {
        self.relock.clone()
    }

    /// Current state (snapshot for display; only the control loop mutates)
    #[must_use]
    pub const fn state(&self) -> GateState {
        self.state
    }

    /// Run the gate until a shutdown signal arrives
    ///
    /// Every failure inside a cycle is recovered and surfaced through the
    /// notification sink; only shutdown ends the loop.
    ///
    /// # Errors
    ///
    /// Currently infallible at the loop level; the signature leaves room
    /// for fatal initialization errors surfaced by collaborators
    pub async fn run(&mut self, shutdown: &mut mpsc::Receiver<()>) -> Result<()> {
        tracing::info!("voice gate running");

        loop {
            if shutdown.try_recv().is_ok() {
                tracing::info!("shutdown requested");
                break;
            }
            // A stale re-lock request while already locked is a no-op.
            self.relock.take();

            match self.wake_cycle(shutdown).await {
                WakeCycle::Retry => {
                    tokio::time::sleep(self.timing.cooldown).await;
                }
                WakeCycle::Completed => {}
            }
        }

        Ok(())
    }

    /// One capture → transcribe → match/verify → decide attempt
    async fn wake_cycle(&mut self, shutdown: &mut mpsc::Receiver<()>) -> WakeCycle {
        self.enter(GateState::Locked);
        self.enter(GateState::AwaitingWakeAttempt);
        self.sink
            .status(&format!(
                "Listening for: '{}, {}'",
                self.matcher.prefix(),
                self.matcher.marker()
            ));

        let clip = match self.capture.capture(self.timing.wake_capture).await {
            Ok(clip) => clip,
            Err(e) => {
                tracing::warn!(error = %e, "wake capture failed");
                self.sink.status("Capture failed, retrying.");
                self.sink.speak("Sorry, I could not access the microphone.");
                return WakeCycle::Retry;
            }
        };

        let transcript = self.transcriber.transcribe(&clip).await;
        self.sink.transcript_detected(&transcript);

        self.enter(GateState::Verifying);
        let phrase_matched = self.matcher.matches(&transcript);

        let profile = match self.store.load() {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(error = %e, "enrollment store unreadable");
                None
            }
        };

        let verification = match self.verifier.verify(&clip, profile.as_ref()).await {
            Ok(verification) => verification,
            Err(e) => {
                tracing::warn!(error = %e, "speaker verification failed");
                self.sink.status("Verification failed, try again.");
                self.sink.speak("Sorry, I could not verify your voice.");
                return WakeCycle::Retry;
            }
        };

        if !phrase_matched {
            self.sink.status("Wrong phrase, try again.");
            self.sink.speak("Sorry, the spoken phrase did not match.");
            return WakeCycle::Retry;
        }

        match verification {
            Verification::NoEnrollment => {
                self.sink.status("No enrolled voice found.");
                self.sink
                    .speak("No enrolled voice found. Please enroll a voice first.");
                WakeCycle::Retry
            }
            Verification::Scored(result) if !result.matched => {
                self.sink.status("Voice not recognized!");
                self.sink.speak("Sorry, your voice was not recognized.");
                WakeCycle::Retry
            }
            Verification::Scored(_) => {
                self.enter(GateState::Unlocked);
                self.sink
                    .status("Voice recognized, system unlocked.");
                self.sink.speak(
                    "Welcome boss, voice recognized successfully. \
                     System unlocked. Nova is listening.",
                );
                self.command_loop(shutdown).await;
                WakeCycle::Completed
            }
        }
    }

    /// The unlocked command sub-loop
    ///
    /// Runs until a re-lock request or shutdown; there is deliberately no
    /// automatic re-lock timeout.
    async fn command_loop(&mut self, shutdown: &mut mpsc::Receiver<()>) {
        loop {
            if shutdown.try_recv().is_ok() {
                tracing::info!("shutdown requested during command loop");
                return;
            }
            if self.relock.take() {
                self.sink.status("System re-locked.");
                self.sink.speak("System locked.");
                return;
            }

            self.enter(GateState::AwaitingCommand);
            self.sink.status("Listening for your command...");

            let clip = match self.capture.capture(self.timing.command_capture).await {
                Ok(clip) => clip,
                Err(e) => {
                    tracing::warn!(error = %e, "command capture failed");
                    self.sink.status("Capture failed, listening again.");
                    self.sink.speak("Sorry, I could not access the microphone.");
                    continue;
                }
            };

            let command = self.transcriber.transcribe(&clip).await;
            self.sink.transcript_detected(&command);
            self.sink.status(&format!("Command: {command}"));

            self.enter(GateState::Dispatching);
            let exchange = self.dispatcher.dispatch(&command).await;

            self.sink.status(&exchange.response);
            self.sink.speak(&exchange.response);

            tokio::time::sleep(self.timing.response_pause).await;
        }
    }

    fn enter(&mut self, state: GateState) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "gate transition");
        }
        self.state = state;
        self.sink.state_entered(state);
    }
}
