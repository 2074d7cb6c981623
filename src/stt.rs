//! Speech-to-text (STT) processing

use async_trait::async_trait;

use crate::audio::{AudioClip, samples_to_wav};
use crate::{Error, Result};

/// Transcribes captured clips to text
///
/// An empty string means no speech was recognized; transcription failures
/// never surface as errors to the gate loop.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a clip, yielding `""` when nothing was recognized
    async fn transcribe(&self, clip: &AudioClip) -> String;
}

/// Response from the Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Transcription via the OpenAI Whisper API
pub struct WhisperTranscriber {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl WhisperTranscriber {
    /// Create a new Whisper transcriber
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for Whisper".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        })
    }

    async fn request(&self, clip: &AudioClip) -> Result<String> {
        let wav = samples_to_wav(clip.samples(), clip.sample_rate())?;
        tracing::debug!(audio_bytes = wav.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await?;
        Ok(result.text)
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, clip: &AudioClip) -> String {
        match self.request(clip).await {
            Ok(text) => {
                let text = text.trim().to_string();
                tracing::info!(transcript = %text, "transcription complete");
                text
            }
            Err(e) => {
                // Unrecognized speech and transport failures look the same
                // to the gate: an empty transcript.
                tracing::warn!(error = %e, "transcription failed");
                String::new()
            }
        }
    }
}
