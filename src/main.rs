use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use nova_gate::audio::{CaptureSession, CpalDevice};
use nova_gate::dispatch::{
    AssistantCompletion, CommandDispatcher, GeminiAssistant, UnconfiguredAssistant,
};
use nova_gate::enrollment::EnrollmentStore;
use nova_gate::gate::VoiceGateStateMachine;
use nova_gate::notify::{CompositeSink, NotificationSink, SpokenSink, TracingSink};
use nova_gate::speaker::{HttpEmbeddingExtractor, SpeakerVerifier, Verification};
use nova_gate::stt::{Transcriber, WhisperTranscriber};
use nova_gate::tts::OpenAiSynthesizer;
use nova_gate::wake::PhraseMatcher;
use nova_gate::{Config, Error};

/// Nova - voice-gated authentication and command dispatch
#[derive(Parser)]
#[command(name = "nova", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the voice gate (default)
    Run,
    /// Record enrollment samples and train the speaker template
    Enroll {
        /// Number of enrollment samples to record
        #[arg(short, long, default_value = "3")]
        samples: usize,
        /// Set a new locker password after enrollment
        #[arg(long)]
        set_password: bool,
    },
    /// Record one clip and test it against the enrolled voice
    Verify,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,nova_gate=info",
        1 => "info,nova_gate=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_gate(&config).await,
        Command::Enroll {
            samples,
            set_password,
        } => enroll(&config, samples, set_password).await,
        Command::Verify => verify(&config).await,
        Command::TestMic { duration } => test_mic(duration).await,
    }
}

/// Run the gate loop until Ctrl-C
#[allow(clippy::future_not_send)]
async fn run_gate(config: &Config) -> anyhow::Result<()> {
    let capture = CaptureSession::new(Box::new(CpalDevice::new()?));
    let transcriber = build_transcriber(config)?;
    let sink = build_sink(config);
    let verifier = SpeakerVerifier::with_threshold(
        Arc::new(HttpEmbeddingExtractor::new(
            config.verify.embedding_url.clone(),
        )?),
        config.verify.threshold,
    );
    let store = EnrollmentStore::new(&config.data_dir);
    let dispatcher = CommandDispatcher::new(build_assistant(config)?);
    let matcher = PhraseMatcher::new(&config.wake.prefix, &config.wake.marker);

    if store.load()?.is_none() {
        tracing::warn!("no enrolled voice yet - run `nova enroll` first");
    }

    let mut machine = VoiceGateStateMachine::new(
        capture,
        transcriber,
        matcher,
        verifier,
        store,
        dispatcher,
        sink,
        config.gate_timing(),
    );

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(()).await;
        }
    });

    tracing::info!(
        prefix = %config.wake.prefix,
        marker = %config.wake.marker,
        "nova gate ready - say the wake phrase"
    );

    // The gate runs on the main task: cpal streams aren't Send.
    machine.run(&mut shutdown_rx).await?;

    tracing::info!("nova gate stopped");
    Ok(())
}

/// Record enrollment samples and save the averaged template
#[allow(clippy::future_not_send)]
async fn enroll(config: &Config, samples: usize, set_password: bool) -> anyhow::Result<()> {
    let capture = CaptureSession::new(Box::new(CpalDevice::new()?));
    let sink = build_sink(config);
    let verifier = SpeakerVerifier::with_threshold(
        Arc::new(HttpEmbeddingExtractor::new(
            config.verify.embedding_url.clone(),
        )?),
        config.verify.threshold,
    );
    let store = EnrollmentStore::new(&config.data_dir);

    // Confirm the locker password up front so the user doesn't record
    // three samples only to be rejected at save time.
    let confirmation = if store.has_password()? {
        let candidate = dialoguer::Password::new()
            .with_prompt("Enter locker password to overwrite the enrolled voice")
            .interact()?;
        if !store.confirm_password(&candidate)? {
            sink.speak("Incorrect password. Cannot change the voice.");
            anyhow::bail!("locker password mismatch");
        }
        Some(candidate)
    } else {
        None
    };

    let duration = Duration::from_secs(config.capture.enroll_secs);
    let mut clips = Vec::with_capacity(samples);
    for i in 1..=samples {
        sink.status(&format!("Recording enrollment sample {i} of {samples}"));
        sink.speak(&format!("Recording {i} started"));
        let clip = capture.capture(duration).await?;
        sink.speak(&format!("Sample {i} complete"));
        clips.push(clip);
    }

    let profile = verifier.enroll(&clips).await?;
    store.save(&profile, confirmation.as_deref())?;

    if set_password {
        let password = dialoguer::Password::new()
            .with_prompt("Enter new locker password")
            .with_confirmation("Confirm new locker password", "Passwords do not match")
            .interact()?;
        store.set_password(&password)?;
        sink.speak("New voice and password enrolled.");
    } else {
        sink.speak("Your voice has been trained and saved.");
    }

    println!("Enrollment complete ({samples} samples averaged).");
    Ok(())
}

/// Record one clip and report whether the enrolled speaker matches
#[allow(clippy::future_not_send)]
async fn verify(config: &Config) -> anyhow::Result<()> {
    let capture = CaptureSession::new(Box::new(CpalDevice::new()?));
    let sink = build_sink(config);
    let transcriber = build_transcriber(config)?;
    let verifier = SpeakerVerifier::with_threshold(
        Arc::new(HttpEmbeddingExtractor::new(
            config.verify.embedding_url.clone(),
        )?),
        config.verify.threshold,
    );
    let store = EnrollmentStore::new(&config.data_dir);

    sink.status("Recording for verification...");
    sink.speak("Voice recording started");
    let clip = capture
        .capture(Duration::from_secs(config.capture.enroll_secs))
        .await?;
    sink.speak("Recording complete");

    let transcript = transcriber.transcribe(&clip).await;
    println!("DETECTED: {}", transcript.to_uppercase());

    let profile = store.load()?;
    match verifier.verify(&clip, profile.as_ref()).await? {
        Verification::NoEnrollment => {
            println!("No enrolled voice found.");
            sink.speak("No enrolled voice found.");
        }
        Verification::Scored(result) if result.matched => {
            println!(
                "Access granted: voice matched (similarity {:.3}).",
                result.similarity
            );
            sink.speak("Access granted. Voice matched.");
        }
        Verification::Scored(result) => {
            println!(
                "Access rejected: voice not matched (similarity {:.3}).",
                result.similarity
            );
            sink.speak("Access rejected. Voice not matched.");
        }
    }

    Ok(())
}

/// Test microphone input with a live RMS meter
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let capture = CaptureSession::new(Box::new(CpalDevice::new()?));
    let window = capture.window();
    println!("Sample rate: {} Hz", capture.sample_rate());
    println!("---");

    for i in 0..duration {
        let clip = capture.capture(Duration::from_secs(1)).await?;
        let rms = calculate_rms(clip.samples());
        let peak = window.peak();

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (rms * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {rms:.4} | Peak: {peak:.4} | [{meter}]", i + 1);
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

fn build_transcriber(config: &Config) -> anyhow::Result<Arc<dyn Transcriber>> {
    let api_key = config
        .api_keys
        .openai
        .clone()
        .ok_or_else(|| Error::Config("OPENAI_API_KEY not set".to_string()))?;
    Ok(Arc::new(WhisperTranscriber::new(
        api_key,
        config.voice.stt_model.clone(),
    )?))
}

/// Build the assistant backend
///
/// Without a Gemini key the gate still runs; commands are answered with
/// the dispatcher's collaborator-error fallback.
fn build_assistant(config: &Config) -> anyhow::Result<Arc<dyn AssistantCompletion>> {
    match config.api_keys.gemini.clone() {
        Some(api_key) => Ok(Arc::new(GeminiAssistant::new(
            api_key,
            config.assistant.model.clone(),
        )?)),
        None => {
            tracing::warn!("GEMINI_API_KEY not set, commands will get a fallback response");
            Ok(Arc::new(UnconfiguredAssistant))
        }
    }
}

/// Build the notification sink: status logging plus spoken feedback when
/// TTS credentials are available
fn build_sink(config: &Config) -> Arc<dyn NotificationSink> {
    let mut sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(TracingSink)];

    match config.api_keys.openai.clone().map(|key| {
        OpenAiSynthesizer::new(
            key,
            config.voice.tts_model.clone(),
            config.voice.tts_voice.clone(),
            config.voice.tts_speed,
        )
    }) {
        Some(Ok(synthesizer)) => {
            sinks.push(Arc::new(SpokenSink::spawn(Arc::new(synthesizer))));
        }
        Some(Err(e)) => {
            tracing::warn!(error = %e, "TTS unavailable, running without spoken feedback");
        }
        None => {
            tracing::warn!("no OpenAI key, running without spoken feedback");
        }
    }

    Arc::new(CompositeSink::new(sinks))
}
